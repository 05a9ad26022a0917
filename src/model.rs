use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type UserId = u64;
pub type RecipeId = u64;

pub const DEFAULT_PROFILE_IMAGE: &str = "default-profile.jpg";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub profile_image: String,
    pub bio: String,
    pub followers: BTreeSet<UserId>,
    pub following: BTreeSet<UserId>,
    pub liked_recipes: BTreeSet<RecipeId>,
    pub saved_recipes: BTreeSet<RecipeId>,
    pub published_recipes: BTreeSet<RecipeId>,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        User {
            username,
            email,
            password_hash,
            full_name: String::new(),
            profile_image: DEFAULT_PROFILE_IMAGE.to_owned(),
            bio: String::new(),
            followers: BTreeSet::new(),
            following: BTreeSet::new(),
            liked_recipes: BTreeSet::new(),
            saved_recipes: BTreeSet::new(),
            published_recipes: BTreeSet::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeType {
    Veg,
    #[serde(rename = "Non-Veg")]
    NonVeg,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Draft,
    Published,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Ingredient {
    pub name: String,
}

/// A stored recipe.
///
/// `liked_by` is the single source for both the `likes` and `likedBy` names
/// exposed on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Recipe {
    pub title: String,
    pub description: String,
    pub author: UserId,
    pub cooking_time: String,
    pub prep_time: Option<String>,
    pub servings: Option<u32>,
    pub difficulty: Difficulty,
    pub image: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
    pub status: Status,
    pub recipe_type: RecipeType,
    pub liked_by: BTreeSet<UserId>,
    pub saved_by: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Recipe {
    pub fn like_count(&self) -> usize {
        self.liked_by.len()
    }

    pub fn is_published(&self) -> bool {
        self.status == Status::Published
    }
}

/// A bearer token's server-side record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
