use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::debug;
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    InvalidOperation(&'static str),

    #[error("{0}")]
    InvalidState(&'static str),

    #[error("{0}")]
    AlreadyExists(&'static str),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Database error")]
    Storage(#[from] sled::Error),

    #[error("Encoding error")]
    Encoding(#[from] bincode::Error),

    #[error("Hashing error")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Internal error: {0}")]
    Internal(&'static str),
}

impl Error {
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Encoding(_) | Error::Hash(_) | Error::Internal(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::InvalidOperation(_)
            | Error::InvalidState(_)
            | Error::AlreadyExists(_)
            | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Storage(_) | Error::Encoding(_) | Error::Hash(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = if self.is_server_fault() {
            debug!("{:?}", self);
            "Something went wrong".to_owned()
        } else {
            self.to_string()
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Error::Unauthenticated, StatusCode::UNAUTHORIZED)]
    #[case(Error::NotFound("Recipe"), StatusCode::NOT_FOUND)]
    #[case(Error::Forbidden("Only the owner can delete this"), StatusCode::FORBIDDEN)]
    #[case(Error::InvalidOperation("You cannot follow yourself"), StatusCode::BAD_REQUEST)]
    #[case(Error::InvalidState("You are not following this user"), StatusCode::BAD_REQUEST)]
    #[case(Error::AlreadyExists("Already saved"), StatusCode::BAD_REQUEST)]
    #[case(Error::Internal("users"), StatusCode::INTERNAL_SERVER_ERROR)]
    fn status_codes(#[case] error: Error, #[case] status: StatusCode) {
        assert_eq!(error.status_code(), status);
    }

    #[test]
    fn server_faults_hide_details() {
        let response = Error::Internal("users_username").error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(Error::Internal("users_username").is_server_fault());
        assert!(!Error::NotFound("User").is_server_fault());
    }

    #[test]
    fn not_found_names_the_resource() {
        assert_eq!(Error::NotFound("Recipe").to_string(), "Recipe not found");
    }
}
