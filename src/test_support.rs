use crate::config::{Config, MIN_BCRYPT_COST};
use crate::database::{RecipeDb, UserDb};
use crate::model::*;
use chrono::{Duration, Utc};
use std::collections::BTreeSet;

pub fn temp_db() -> sled::Db {
    sled::Config::new()
        .temporary(true)
        .open()
        .expect("temporary database")
}

pub fn test_config() -> Config {
    Config {
        bcrypt_cost: MIN_BCRYPT_COST,
        ..Config::default()
    }
}

/// A user whose password is `password`, hashed at the minimum cost.
pub fn user(username: &str) -> User {
    User::new(
        username.to_owned(),
        format!("{}@example.com", username),
        bcrypt::hash("password", MIN_BCRYPT_COST).expect("hash"),
    )
}

pub fn add_user(db: &sled::Db, username: &str) -> UserId {
    db.add_user(&user(username))
        .expect("store")
        .expect("unique username")
}

pub fn recipe(author: UserId, title: &str, status: Status) -> Recipe {
    Recipe {
        title: title.to_owned(),
        description: format!("How to make {}", title.to_lowercase()),
        author,
        cooking_time: "30 mins".to_owned(),
        prep_time: Some("10 mins".to_owned()),
        servings: Some(2),
        difficulty: Difficulty::Medium,
        image: "dish.jpg".to_owned(),
        ingredients: vec![Ingredient {
            name: "salt".to_owned(),
        }],
        instructions: vec!["Cook it".to_owned()],
        status,
        recipe_type: RecipeType::Veg,
        liked_by: BTreeSet::new(),
        saved_by: BTreeSet::new(),
        created_at: Utc::now(),
    }
}

pub fn add_recipe(db: &sled::Db, author: UserId, title: &str, status: Status) -> RecipeId {
    db.add_recipe(&recipe(author, title, status)).expect("store")
}

/// Adds a recipe created `minutes_ago` minutes in the past.
pub fn add_aged_recipe(
    db: &sled::Db,
    author: UserId,
    title: &str,
    status: Status,
    minutes_ago: i64,
) -> RecipeId {
    let mut r = recipe(author, title, status);
    r.created_at = Utc::now() - Duration::minutes(minutes_ago);
    db.add_recipe(&r).expect("store")
}

/// Builds the full application around `$db` and `$config` for
/// `actix_web::test` calls.
macro_rules! test_app {
    ($db:expr, $config:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(actix_identity::IdentityService::new(
                    crate::identity::BearerTokenPolicy::new($db.clone()),
                ))
                .app_data(actix_web::web::Data::new($db.clone()))
                .app_data(actix_web::web::Data::new($config))
                .configure(crate::routes),
        )
        .await
    };
}

pub(crate) use test_app;
