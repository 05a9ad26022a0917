use crate::config::Config;
use crate::database::UserDb;
use crate::error::{Error, Result};
use crate::identity::{hash_password, verify_password, Actor, IdentityProvider};
use crate::model::User;
use actix_identity::Identity;
use actix_web::{web, HttpResponse};
use log::info;
use serde::Deserialize;
use serde_json::json;

type Db = web::Data<sled::Db>;

#[derive(Deserialize)]
pub struct RegisterParams {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub struct LoginParams {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// Loose `local@domain.tld` shape check.
fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !email.contains(char::is_whitespace)
                && domain
                    .rsplit_once('.')
                    .map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

impl RegisterParams {
    fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::InvalidRequest("Username is required".to_owned()));
        }
        if !looks_like_email(&self.email) {
            return Err(Error::InvalidRequest("A valid email is required".to_owned()));
        }
        if self.password.is_empty() {
            return Err(Error::InvalidRequest("Password is required".to_owned()));
        }
        Ok(())
    }
}

pub async fn register(
    params: web::Json<RegisterParams>,
    db: Db,
    config: web::Data<Config>,
) -> actix_web::Result<HttpResponse> {
    params.validate()?;
    let user = User::new(
        params.username.trim().to_owned(),
        params.email.trim().to_owned(),
        hash_password(&params.password, config.bcrypt_cost)?,
    );
    let user_id = db
        .add_user(&user)?
        .ok_or(Error::AlreadyExists("Username or email already taken"))?;
    info!("registered user {} ({})", user.username, user_id);
    Ok(HttpResponse::Created().json(json!({
        "message": "User created",
        "userId": user_id,
        "username": user.username,
        "email": user.email,
    })))
}

pub async fn login(
    params: web::Json<LoginParams>,
    db: Db,
    config: web::Data<Config>,
) -> actix_web::Result<HttpResponse> {
    if let Some((user_id, user)) = db.get_user_by_email(params.email.trim())? {
        if verify_password(&params.password, &user.password_hash)? {
            let token = db.issue(user_id, config.token_ttl)?;
            return Ok(HttpResponse::Ok().json(json!({
                "token": token,
                "userId": user_id,
                "username": user.username,
                "email": user.email,
            })));
        }
    }
    Err(Error::InvalidRequest("Wrong email or password".to_owned()).into())
}

pub async fn logout(actor: Actor, id: Identity) -> actix_web::Result<HttpResponse> {
    id.forget();
    info!("user {} logged out", actor.username);
    Ok(HttpResponse::Ok().json(json!({ "message": "Logged out" })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout)),
    );
}
