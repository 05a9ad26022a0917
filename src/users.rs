use crate::auth;
use crate::database::{ProfileUpdate, RecipeDb, UserDb};
use crate::error::Error;
use crate::identity::Actor;
use crate::model::{RecipeId, UserId};
use crate::policy::Relationships;
use crate::view::{full_profile, profile, profile_with_connections, recipe_card};
use actix_web::{web, HttpResponse};
use log::info;
use serde::Deserialize;
use serde_json::json;

type Db = web::Data<sled::Db>;

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileForm {
    full_name: Option<String>,
    username: Option<String>,
    profile_image: Option<String>,
    bio: Option<String>,
}

impl From<ProfileForm> for ProfileUpdate {
    fn from(form: ProfileForm) -> Self {
        ProfileUpdate {
            full_name: form.full_name,
            username: form.username.map(|u| u.trim().to_owned()),
            profile_image: form.profile_image,
            bio: form.bio,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeRef {
    recipe_id: RecipeId,
}

async fn get_profile(actor: Actor, db: Db) -> actix_web::Result<HttpResponse> {
    let user = db
        .get_user(actor.user_id)?
        .ok_or(Error::NotFound("User"))?;
    Ok(HttpResponse::Ok().json(full_profile(&db, actor.user_id, &user)?))
}

async fn current(actor: Actor, db: Db) -> actix_web::Result<HttpResponse> {
    let user = db
        .get_user(actor.user_id)?
        .ok_or(Error::NotFound("User"))?;
    Ok(HttpResponse::Ok().json(profile_with_connections(&db, actor.user_id, &user)?))
}

async fn update_profile(
    actor: Actor,
    form: web::Json<ProfileForm>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let user = db.update_profile(actor.user_id, &form.into_inner().into())?;
    info!("user {} updated their profile", actor.user_id);
    Ok(HttpResponse::Ok().json(profile(actor.user_id, &user)))
}

async fn check_username(path: web::Path<String>, db: Db) -> actix_web::Result<HttpResponse> {
    let available = !db.username_taken(&path)?;
    Ok(HttpResponse::Ok().json(json!({ "available": available })))
}

async fn search(path: web::Path<String>, db: Db) -> actix_web::Result<HttpResponse> {
    let (id, user) = db
        .get_user_by_username(&path)?
        .ok_or(Error::NotFound("User"))?;
    Ok(HttpResponse::Ok().json(profile(id, &user)))
}

async fn recipes_of(path: web::Path<UserId>, db: Db) -> actix_web::Result<HttpResponse> {
    let cards = db
        .recipes_by_author(path.into_inner())?
        .into_iter()
        .map(|(id, recipe)| recipe_card(&db, id, recipe))
        .collect::<crate::error::Result<Vec<_>>>()?;
    Ok(HttpResponse::Ok().json(cards))
}

async fn follow(actor: Actor, path: web::Path<String>, db: Db) -> actix_web::Result<HttpResponse> {
    db.follow(actor.user_id, &path)?;
    Ok(HttpResponse::Ok().json(json!({ "message": "User followed" })))
}

async fn unfollow(
    actor: Actor,
    path: web::Path<String>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    db.unfollow(actor.user_id, &path)?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Unfollowed successfully" })))
}

async fn like(actor: Actor, body: web::Json<RecipeRef>, db: Db) -> actix_web::Result<HttpResponse> {
    let likes = db.like(actor.user_id, body.recipe_id)?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Recipe liked", "likes": likes })))
}

async fn unlike(
    actor: Actor,
    body: web::Json<RecipeRef>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let likes = db.unlike(actor.user_id, body.recipe_id)?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Recipe unliked", "likes": likes })))
}

async fn save(actor: Actor, body: web::Json<RecipeRef>, db: Db) -> actix_web::Result<HttpResponse> {
    let saved_by = db.save(actor.user_id, body.recipe_id)?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Recipe saved", "savedBy": saved_by })))
}

async fn unsave(
    actor: Actor,
    body: web::Json<RecipeRef>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let saved_by = db.unsave(actor.user_id, body.recipe_id)?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Recipe unsaved", "savedBy": saved_by })))
}

async fn publish(
    actor: Actor,
    body: web::Json<RecipeRef>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    db.publish(actor.user_id, body.recipe_id)?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Recipe published" })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .route("/register", web::post().to(auth::register))
            .route("/login", web::post().to(auth::login))
            .route("/profile", web::get().to(get_profile))
            .route("/profile", web::put().to(update_profile))
            .route("/current", web::get().to(current))
            .route("/check-username/{username}", web::get().to(check_username))
            .route("/search/{username}", web::get().to(search))
            .route("/follow/username/{username}", web::post().to(follow))
            .route("/unfollow/username/{username}", web::post().to(unfollow))
            .route("/like", web::post().to(like))
            .route("/unlike", web::post().to(unlike))
            .route("/save", web::post().to(save))
            .route("/unsave", web::post().to(unsave))
            .route("/publish", web::post().to(publish))
            .route("/{user_id}/recipes", web::get().to(recipes_of)),
    );
}
