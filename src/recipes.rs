use crate::config::Config;
use crate::database::RecipeDb;
use crate::error::{Error, Result};
use crate::feed::{Feeds, Page};
use crate::identity::Actor;
use crate::model::*;
use crate::policy::Relationships;
use crate::view::{recipe_card, recipe_detail};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;

type Db = web::Data<sled::Db>;

/// A single string is accepted as a one-step list.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Instructions {
    Steps(Vec<String>),
    Single(String),
}

impl Instructions {
    fn into_steps(self) -> Vec<String> {
        match self {
            Instructions::Steps(steps) => steps,
            Instructions::Single(step) => vec![step],
        }
    }
}

/// Body of create, draft and edit requests. Every field is optional here;
/// creation enforces the required ones and editing skips empty ones.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecipeForm {
    title: Option<String>,
    description: Option<String>,
    ingredients: Option<Vec<Ingredient>>,
    instructions: Option<Instructions>,
    cooking_time: Option<String>,
    prep_time: Option<String>,
    servings: Option<u32>,
    difficulty: Option<Difficulty>,
    recipe_type: Option<RecipeType>,
    image: Option<String>,
    status: Option<Status>,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn required(value: &Option<String>, field: &str) -> Result<String> {
    present(value).ok_or_else(|| Error::InvalidRequest(format!("{} is required", field)))
}

impl RecipeForm {
    fn steps(&self) -> Option<Vec<String>> {
        self.instructions
            .clone()
            .map(Instructions::into_steps)
            .filter(|steps| !steps.is_empty())
    }

    fn into_recipe(self, author: UserId, status: Option<Status>) -> Result<Recipe> {
        let instructions = self
            .steps()
            .ok_or_else(|| Error::InvalidRequest("instructions are required".to_owned()))?;
        let recipe_type = self
            .recipe_type
            .ok_or_else(|| Error::InvalidRequest("recipeType is required".to_owned()))?;
        Ok(Recipe {
            title: required(&self.title, "title")?,
            description: required(&self.description, "description")?,
            author,
            cooking_time: required(&self.cooking_time, "cookingTime")?,
            prep_time: present(&self.prep_time),
            servings: self.servings.filter(|s| *s > 0),
            difficulty: self.difficulty.unwrap_or_default(),
            image: required(&self.image, "image")?,
            ingredients: self.ingredients.unwrap_or_default(),
            instructions,
            status: status.or(self.status).unwrap_or_default(),
            recipe_type,
            liked_by: BTreeSet::new(),
            saved_by: BTreeSet::new(),
            created_at: Utc::now(),
        })
    }

    /// Overwrites the fields that are present and non-empty. The author is
    /// never touched.
    fn apply(&self, recipe: &mut Recipe) {
        if let Some(title) = present(&self.title) {
            recipe.title = title;
        }
        if let Some(description) = present(&self.description) {
            recipe.description = description;
        }
        if let Some(ingredients) = self.ingredients.as_ref().filter(|i| !i.is_empty()) {
            recipe.ingredients = ingredients.clone();
        }
        if let Some(steps) = self.steps() {
            recipe.instructions = steps;
        }
        if let Some(cooking_time) = present(&self.cooking_time) {
            recipe.cooking_time = cooking_time;
        }
        if let Some(prep_time) = present(&self.prep_time) {
            recipe.prep_time = Some(prep_time);
        }
        if let Some(servings) = self.servings.filter(|s| *s > 0) {
            recipe.servings = Some(servings);
        }
        if let Some(difficulty) = self.difficulty {
            recipe.difficulty = difficulty;
        }
        if let Some(recipe_type) = self.recipe_type {
            recipe.recipe_type = recipe_type;
        }
        if let Some(image) = present(&self.image) {
            recipe.image = image;
        }
        if let Some(status) = self.status {
            recipe.status = status;
        }
    }
}

#[derive(Deserialize)]
pub struct PageQuery {
    page: Option<String>,
    limit: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    query: Option<String>,
}

fn store_recipe(db: &sled::Db, recipe: Recipe, message: &str) -> Result<HttpResponse> {
    let id = db.add_recipe(&recipe)?;
    info!(
        "user {} created recipe {} ({:?})",
        recipe.author, id, recipe.status
    );
    Ok(HttpResponse::Created().json(json!({
        "message": message,
        "recipe": recipe_card(db, id, recipe)?,
    })))
}

async fn create(
    actor: Actor,
    form: web::Json<RecipeForm>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let recipe = form.into_inner().into_recipe(actor.user_id, None)?;
    Ok(store_recipe(&db, recipe, "Recipe created")?)
}

async fn draft(
    actor: Actor,
    form: web::Json<RecipeForm>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let recipe = form
        .into_inner()
        .into_recipe(actor.user_id, Some(Status::Draft))?;
    Ok(store_recipe(&db, recipe, "Draft saved")?)
}

async fn list(query: web::Query<PageQuery>, db: Db) -> actix_web::Result<HttpResponse> {
    let page = Page::parse(query.page.as_deref(), query.limit.as_deref());
    Ok(HttpResponse::Ok().json(db.published_feed(page)?))
}

async fn trending(db: Db) -> actix_web::Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(db.trending_feed()?))
}

async fn recent(db: Db) -> actix_web::Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(db.recent_feed()?))
}

async fn search(query: web::Query<SearchQuery>, db: Db) -> actix_web::Result<HttpResponse> {
    let query = query.query.as_deref().unwrap_or_default();
    Ok(HttpResponse::Ok().json(db.search(query)?))
}

fn find(db: &sled::Db, id: RecipeId) -> Result<Recipe> {
    db.get_recipe(id)?.ok_or(Error::NotFound("Recipe"))
}

async fn get(path: web::Path<RecipeId>, db: Db) -> actix_web::Result<HttpResponse> {
    let id = path.into_inner();
    let recipe = find(&db, id)?;
    Ok(HttpResponse::Ok().json(recipe_detail(&db, id, recipe)?))
}

async fn edit(
    actor: Actor,
    path: web::Path<RecipeId>,
    form: web::Json<RecipeForm>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let id = path.into_inner();
    db.update_recipe(id, |recipe| {
        if recipe.author != actor.user_id {
            return Err(Error::Forbidden("Only the owner can edit this"));
        }
        form.apply(recipe);
        Ok(())
    })?;
    info!("user {} updated recipe {}", actor.user_id, id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Recipe updated", "recipeId": id })))
}

async fn delete(
    actor: Actor,
    path: web::Path<RecipeId>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let id = path.into_inner();
    db.delete_recipe(actor.user_id, id)?;
    info!("user {} deleted recipe {}", actor.user_id, id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Recipe deleted" })))
}

async fn like(actor: Actor, path: web::Path<RecipeId>, db: Db) -> actix_web::Result<HttpResponse> {
    let state = db.toggle_like(actor.user_id, path.into_inner())?;
    let message = if state.liked { "Recipe liked" } else { "Like removed" };
    Ok(HttpResponse::Ok().json(json!({ "message": message, "likes": state.likes })))
}

async fn save(actor: Actor, path: web::Path<RecipeId>, db: Db) -> actix_web::Result<HttpResponse> {
    let saved_by = db.save(actor.user_id, path.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Recipe saved", "savedBy": saved_by })))
}

async fn unsave(
    actor: Actor,
    path: web::Path<RecipeId>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let saved_by = db.unsave(actor.user_id, path.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Recipe unsaved", "savedBy": saved_by })))
}

async fn share(
    path: web::Path<RecipeId>,
    db: Db,
    config: web::Data<Config>,
) -> actix_web::Result<HttpResponse> {
    let id = path.into_inner();
    find(&db, id)?;
    Ok(HttpResponse::Ok().json(json!({ "shareLink": config.share_link(id) })))
}

async fn is_liked(
    actor: Actor,
    path: web::Path<RecipeId>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let recipe = find(&db, path.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({ "isLiked": recipe.liked_by.contains(&actor.user_id) })))
}

async fn is_saved(
    actor: Actor,
    path: web::Path<RecipeId>,
    db: Db,
) -> actix_web::Result<HttpResponse> {
    let recipe = find(&db, path.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({ "isSaved": recipe.saved_by.contains(&actor.user_id) })))
}

// Fixed paths are registered before `/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/recipes")
            .route("", web::post().to(create))
            .route("", web::get().to(list))
            .route("/trending", web::get().to(trending))
            .route("/recent", web::get().to(recent))
            .route("/search", web::get().to(search))
            .route("/draft", web::post().to(draft))
            .route("/{id}", web::get().to(get))
            .route("/{id}", web::put().to(edit))
            .route("/{id}", web::delete().to(delete))
            .route("/{id}/like", web::post().to(like))
            .route("/{id}/save", web::post().to(save))
            .route("/{id}/unsave", web::post().to(unsave))
            .route("/{id}/share", web::post().to(share))
            .route("/{id}/is-liked", web::get().to(is_liked))
            .route("/{id}/is-saved", web::get().to(is_saved)),
    );
}
