use crate::database::{RecipeDb, UserDb};
use crate::error::Result;
use crate::model::*;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: UserId,
    pub username: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: UserId,
    pub username: String,
    pub profile_image: String,
}

/// A recipe on the wire. `M` is how member sets are rendered: bare ids in
/// feeds, [`UserRef`]s on the detail page. `likes` and `likedBy` are the same
/// set under both names.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecipeView<M> {
    pub id: RecipeId,
    pub title: String,
    pub description: String,
    pub author: Option<AuthorSummary>,
    pub cooking_time: String,
    pub prep_time: Option<String>,
    pub servings: Option<u32>,
    pub difficulty: Difficulty,
    pub image: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
    pub status: Status,
    pub recipe_type: RecipeType,
    pub likes: Vec<M>,
    pub liked_by: Vec<M>,
    pub saved_by: Vec<M>,
    pub created_at: DateTime<Utc>,
}

pub type RecipeCard = RecipeView<UserId>;
pub type RecipeDetail = RecipeView<UserRef>;

impl<M: Clone> RecipeView<M> {
    fn build(
        id: RecipeId,
        recipe: Recipe,
        author: Option<AuthorSummary>,
        liked_by: Vec<M>,
        saved_by: Vec<M>,
    ) -> Self {
        RecipeView {
            id,
            title: recipe.title,
            description: recipe.description,
            author,
            cooking_time: recipe.cooking_time,
            prep_time: recipe.prep_time,
            servings: recipe.servings,
            difficulty: recipe.difficulty,
            image: recipe.image,
            ingredients: recipe.ingredients,
            instructions: recipe.instructions,
            status: recipe.status,
            recipe_type: recipe.recipe_type,
            likes: liked_by.clone(),
            liked_by,
            saved_by,
            created_at: recipe.created_at,
        }
    }
}

impl<M> RecipeView<M> {
    pub fn like_count(&self) -> usize {
        self.liked_by.len()
    }
}

/// A user profile on the wire. `F` renders follower/following entries and
/// `R` renders recipe lists. The password hash never appears.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView<F, R> {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub profile_image: String,
    pub bio: String,
    pub followers: Vec<F>,
    pub following: Vec<F>,
    pub liked_recipes: Vec<R>,
    pub saved_recipes: Vec<R>,
    pub published_recipes: Vec<R>,
}

impl<F, R> ProfileView<F, R> {
    fn build(
        id: UserId,
        user: &User,
        followers: Vec<F>,
        following: Vec<F>,
        recipes: [Vec<R>; 3],
    ) -> Self {
        let [liked_recipes, saved_recipes, published_recipes] = recipes;
        ProfileView {
            id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            profile_image: user.profile_image.clone(),
            bio: user.bio.clone(),
            followers,
            following,
            liked_recipes,
            saved_recipes,
            published_recipes,
        }
    }
}

pub fn author_summary(db: &sled::Db, id: UserId) -> Result<Option<AuthorSummary>> {
    Ok(db.get_user(id)?.map(|user| AuthorSummary {
        id,
        username: user.username,
        profile_image: user.profile_image,
    }))
}

pub fn user_ref(db: &sled::Db, id: UserId) -> Result<Option<UserRef>> {
    Ok(db.get_user(id)?.map(|user| UserRef {
        id,
        username: user.username,
    }))
}

/// Populates each id with `lookup`, dropping ids that no longer resolve.
fn populate<'a, T, I>(ids: I, lookup: impl Fn(u64) -> Result<Option<T>>) -> Result<Vec<T>>
where
    I: IntoIterator<Item = &'a u64>,
{
    let mut found = Vec::new();
    for id in ids {
        if let Some(item) = lookup(*id)? {
            found.push(item);
        }
    }
    Ok(found)
}

pub fn recipe_card(db: &sled::Db, id: RecipeId, recipe: Recipe) -> Result<RecipeCard> {
    let author = author_summary(db, recipe.author)?;
    let liked_by = recipe.liked_by.iter().copied().collect();
    let saved_by = recipe.saved_by.iter().copied().collect();
    Ok(RecipeView::build(id, recipe, author, liked_by, saved_by))
}

pub fn recipe_detail(db: &sled::Db, id: RecipeId, recipe: Recipe) -> Result<RecipeDetail> {
    let author = author_summary(db, recipe.author)?;
    let liked_by = populate(&recipe.liked_by, |user| user_ref(db, user))?;
    let saved_by = populate(&recipe.saved_by, |user| user_ref(db, user))?;
    Ok(RecipeView::build(id, recipe, author, liked_by, saved_by))
}

/// Public profile with relationship sets left as ids.
pub fn profile(id: UserId, user: &User) -> ProfileView<UserId, RecipeId> {
    let ids = |set: &std::collections::BTreeSet<u64>| set.iter().copied().collect::<Vec<_>>();
    ProfileView::build(
        id,
        user,
        ids(&user.followers),
        ids(&user.following),
        [
            ids(&user.liked_recipes),
            ids(&user.saved_recipes),
            ids(&user.published_recipes),
        ],
    )
}

/// Profile with followers and following resolved to usernames.
pub fn profile_with_connections(
    db: &sled::Db,
    id: UserId,
    user: &User,
) -> Result<ProfileView<UserRef, RecipeId>> {
    let ids = |set: &std::collections::BTreeSet<u64>| set.iter().copied().collect::<Vec<_>>();
    Ok(ProfileView::build(
        id,
        user,
        populate(&user.followers, |f| user_ref(db, f))?,
        populate(&user.following, |f| user_ref(db, f))?,
        [
            ids(&user.liked_recipes),
            ids(&user.saved_recipes),
            ids(&user.published_recipes),
        ],
    ))
}

/// Fully populated profile: connections with avatars and recipe cards.
pub fn full_profile(
    db: &sled::Db,
    id: UserId,
    user: &User,
) -> Result<ProfileView<AuthorSummary, RecipeCard>> {
    let card = |recipe_id: RecipeId| -> Result<Option<RecipeCard>> {
        db.get_recipe(recipe_id)?
            .map(|recipe| recipe_card(db, recipe_id, recipe))
            .transpose()
    };
    Ok(ProfileView::build(
        id,
        user,
        populate(&user.followers, |f| author_summary(db, f))?,
        populate(&user.following, |f| author_summary(db, f))?,
        [
            populate(&user.liked_recipes, card)?,
            populate(&user.saved_recipes, card)?,
            populate(&user.published_recipes, card)?,
        ],
    ))
}
