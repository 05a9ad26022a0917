use crate::database::{decode, encode, UserDb, SESSIONS};
use crate::error::{Error, Result};
use crate::model::{Session, UserId};
use actix_identity::{IdentityPolicy, RequestIdentity};
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse};
use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Serialize;
use std::future::{ready, Ready};
use uuid::Uuid;

/// The authenticated caller of a request.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
}

pub trait IdentityProvider {
    fn issue(&self, user_id: UserId, ttl: Duration) -> Result<String>;
    fn session_user(&self, token: &str) -> Result<Option<UserId>>;
    fn verify(&self, token: &str) -> Result<Option<Actor>>;
    fn revoke(&self, token: &str) -> Result<()>;
}

fn sweep_expired(sessions: &sled::Tree, now: DateTime<Utc>) -> Result<usize> {
    let mut removed = 0;
    for entry in sessions.iter() {
        let (token, bytes) = entry?;
        let session: Session = decode(&bytes)?;
        if session.is_expired(now) {
            sessions.remove(token)?;
            removed += 1;
        }
    }
    Ok(removed)
}

impl IdentityProvider for sled::Db {
    // Expired sessions are swept on every issue.
    fn issue(&self, user_id: UserId, ttl: Duration) -> Result<String> {
        let sessions = self.open_tree(SESSIONS)?;
        let swept = sweep_expired(&sessions, Utc::now())?;
        if swept > 0 {
            debug!("removed {} expired sessions", swept);
        }
        let token = Uuid::new_v4().simple().to_string();
        let session = Session {
            user_id,
            expires_at: Utc::now() + ttl,
        };
        sessions.insert(token.as_bytes(), encode(&session)?)?;
        debug!("issued token for user {}", user_id);
        Ok(token)
    }

    /// Expired sessions are removed when they are looked up.
    fn session_user(&self, token: &str) -> Result<Option<UserId>> {
        let sessions = self.open_tree(SESSIONS)?;
        let session: Session = match sessions.get(token.as_bytes())? {
            Some(bytes) => decode(&bytes)?,
            None => return Ok(None),
        };
        if session.is_expired(Utc::now()) {
            sessions.remove(token.as_bytes())?;
            return Ok(None);
        }
        Ok(Some(session.user_id))
    }

    fn verify(&self, token: &str) -> Result<Option<Actor>> {
        let user_id = match self.session_user(token)? {
            Some(user_id) => user_id,
            None => return Ok(None),
        };
        Ok(self.get_user(user_id)?.map(|user| Actor {
            user_id,
            username: user.username,
            email: user.email,
        }))
    }

    fn revoke(&self, token: &str) -> Result<()> {
        self.open_tree(SESSIONS)?.remove(token.as_bytes())?;
        Ok(())
    }
}

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    Ok(bcrypt::hash(password, cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    Ok(bcrypt::verify(password, hash)?)
}

/// Accepts both `Bearer <token>` and a bare token.
pub fn bearer_token(value: &str) -> Option<&str> {
    let value = value.trim();
    let token = match value.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => value,
    };
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn request_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
}

/// Resolves the `Authorization` header to the identity of the token's user.
/// Forgetting an identity revokes the token the request presented.
pub struct BearerTokenPolicy {
    db: sled::Db,
}

impl BearerTokenPolicy {
    pub fn new(db: sled::Db) -> Self {
        BearerTokenPolicy { db }
    }
}

impl IdentityPolicy for BearerTokenPolicy {
    type Future = Ready<std::result::Result<Option<String>, actix_web::Error>>;
    type ResponseFuture = Ready<std::result::Result<(), actix_web::Error>>;

    fn from_request(&self, req: &mut ServiceRequest) -> Self::Future {
        let identity = match request_token(req.headers()) {
            Some(token) => self
                .db
                .session_user(token)
                .map(|user| user.map(|id| id.to_string())),
            None => Ok(None),
        };
        ready(identity.map_err(actix_web::Error::from))
    }

    fn to_response<B>(
        &self,
        identity: Option<String>,
        changed: bool,
        response: &mut ServiceResponse<B>,
    ) -> Self::ResponseFuture {
        let mut result = Ok(());
        if changed && identity.is_none() {
            if let Some(token) = request_token(response.request().headers()) {
                result = self.db.revoke(token).map_err(actix_web::Error::from);
            }
        }
        ready(result)
    }
}

fn resolve_actor(req: &HttpRequest) -> Result<Actor> {
    let user_id = req
        .get_identity()
        .and_then(|id| id.parse::<UserId>().ok())
        .ok_or(Error::Unauthenticated)?;
    let db = req
        .app_data::<web::Data<sled::Db>>()
        .ok_or(Error::Internal("database not configured"))?;
    let user = db.get_user(user_id)?.ok_or(Error::Unauthenticated)?;
    Ok(Actor {
        user_id,
        username: user.username,
        email: user.email,
    })
}

impl FromRequest for Actor {
    type Error = Error;
    type Future = Ready<Result<Self>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(resolve_actor(req))
    }
}
