use crate::database::*;
use crate::error::{Error, Result};
use crate::model::*;
use log::debug;
use sled::transaction::{ConflictableTransactionError, TransactionalTree, Transactional};
use std::collections::BTreeSet;

/// Outcome of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub likes: usize,
}

pub trait Relationships {
    fn follow(&self, actor: UserId, target: &str) -> Result<()>;
    fn unfollow(&self, actor: UserId, target: &str) -> Result<()>;
    fn toggle_like(&self, actor: UserId, recipe: RecipeId) -> Result<LikeState>;
    /// Like that refuses a recipe the actor already likes.
    fn like(&self, actor: UserId, recipe: RecipeId) -> Result<usize>;
    fn unlike(&self, actor: UserId, recipe: RecipeId) -> Result<usize>;
    fn save(&self, actor: UserId, recipe: RecipeId) -> Result<usize>;
    fn unsave(&self, actor: UserId, recipe: RecipeId) -> Result<usize>;
    fn publish(&self, actor: UserId, recipe: RecipeId) -> Result<()>;
    /// Deletes an owned recipe and purges it from every user's lists.
    fn delete_recipe(&self, actor: UserId, recipe: RecipeId) -> Result<()>;
}

fn load_user(users: &TransactionalTree, id: UserId) -> TxResult<User> {
    match tx_get(users, id)? {
        Some(user) => Ok(user),
        None => sled::transaction::abort(Error::NotFound("User")),
    }
}

fn load_recipe(recipes: &TransactionalTree, id: RecipeId) -> TxResult<Recipe> {
    match tx_get(recipes, id)? {
        Some(recipe) => Ok(recipe),
        None => sled::transaction::abort(Error::NotFound("Recipe")),
    }
}

fn resolve_username(index: &TransactionalTree, username: &str) -> TxResult<UserId> {
    match index.get(username.as_bytes())? {
        Some(id) => deserialize_id(id).map_err(ConflictableTransactionError::Abort),
        None => sled::transaction::abort(Error::NotFound("User")),
    }
}

fn references(user: &User, recipe: RecipeId) -> bool {
    user.liked_recipes.contains(&recipe)
        || user.saved_recipes.contains(&recipe)
        || user.published_recipes.contains(&recipe)
}

fn forget_recipe(user: &mut User, recipe: RecipeId) {
    user.liked_recipes.remove(&recipe);
    user.saved_recipes.remove(&recipe);
    user.published_recipes.remove(&recipe);
}

fn referencing_users(users: &sled::Tree, recipe: RecipeId) -> Result<BTreeSet<UserId>> {
    let mut found = BTreeSet::new();
    for entry in users.iter() {
        let (key, value) = entry?;
        let user: User = decode(&value)?;
        if references(&user, recipe) {
            found.insert(deserialize_id(key)?);
        }
    }
    Ok(found)
}

/// Removes references to a recipe that no longer exists. Catches users who
/// linked the recipe between the holder scan and the delete commit.
fn purge_stragglers(users: &sled::Tree, recipe: RecipeId) -> Result<usize> {
    let mut purged = 0;
    for holder in referencing_users(users, recipe)? {
        let changed = finish(users.transaction(|users| {
            match tx_get::<User>(users, holder)? {
                Some(mut user) if references(&user, recipe) => {
                    forget_recipe(&mut user, recipe);
                    tx_put(users, holder, &user)?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }))?;
        if changed {
            purged += 1;
        }
    }
    Ok(purged)
}

/// Loads `actor` and `recipe_id`, lets `change` mutate both and writes both
/// back. An error from `change` aborts without writing.
fn with_recipe_pair<T, F>(db: &sled::Db, actor: UserId, recipe_id: RecipeId, change: F) -> Result<T>
where
    F: Fn(&mut User, &mut Recipe) -> Result<T>,
{
    let users = db.open_tree(USERS)?;
    let recipes = db.open_tree(RECIPES)?;
    finish((&users, &recipes).transaction(|(users, recipes)| {
        let mut recipe = load_recipe(recipes, recipe_id)?;
        let mut user = load_user(users, actor)?;
        let outcome = change(&mut user, &mut recipe).map_err(ConflictableTransactionError::Abort)?;
        tx_put(users, actor, &user)?;
        tx_put(recipes, recipe_id, &recipe)?;
        Ok(outcome)
    }))
}

impl Relationships for sled::Db {
    fn follow(&self, actor: UserId, target: &str) -> Result<()> {
        let users = self.open_tree(USERS)?;
        let users_username = self.open_tree(USERS_USERNAME)?;
        let changed = finish((&users, &users_username).transaction(|(users, users_username)| {
            let target_id = resolve_username(users_username, target)?;
            let mut target_user = load_user(users, target_id)?;
            let mut actor_user = load_user(users, actor)?;
            if target_id == actor {
                return sled::transaction::abort(Error::InvalidOperation(
                    "You cannot follow yourself",
                ));
            }
            if actor_user.following.contains(&target_id) {
                return Ok(false);
            }
            actor_user.following.insert(target_id);
            target_user.followers.insert(actor);
            tx_put(users, actor, &actor_user)?;
            tx_put(users, target_id, &target_user)?;
            Ok(true)
        }))?;
        if changed {
            debug!("user {} followed {}", actor, target);
        }
        Ok(())
    }

    fn unfollow(&self, actor: UserId, target: &str) -> Result<()> {
        let users = self.open_tree(USERS)?;
        let users_username = self.open_tree(USERS_USERNAME)?;
        finish((&users, &users_username).transaction(|(users, users_username)| {
            let target_id = resolve_username(users_username, target)?;
            let mut target_user = load_user(users, target_id)?;
            let mut actor_user = load_user(users, actor)?;
            if !actor_user.following.remove(&target_id) {
                return sled::transaction::abort(Error::InvalidState(
                    "You are not following this user",
                ));
            }
            target_user.followers.remove(&actor);
            tx_put(users, actor, &actor_user)?;
            tx_put(users, target_id, &target_user)?;
            Ok(())
        }))?;
        debug!("user {} unfollowed {}", actor, target);
        Ok(())
    }

    fn toggle_like(&self, actor: UserId, recipe_id: RecipeId) -> Result<LikeState> {
        with_recipe_pair(self, actor, recipe_id, |user, recipe| {
            let liked = if recipe.liked_by.remove(&actor) {
                user.liked_recipes.remove(&recipe_id);
                false
            } else {
                recipe.liked_by.insert(actor);
                user.liked_recipes.insert(recipe_id);
                true
            };
            Ok(LikeState {
                liked,
                likes: recipe.like_count(),
            })
        })
    }

    fn like(&self, actor: UserId, recipe_id: RecipeId) -> Result<usize> {
        with_recipe_pair(self, actor, recipe_id, |user, recipe| {
            if user.liked_recipes.contains(&recipe_id) || recipe.liked_by.contains(&actor) {
                return Err(Error::AlreadyExists("Already liked"));
            }
            user.liked_recipes.insert(recipe_id);
            recipe.liked_by.insert(actor);
            Ok(recipe.like_count())
        })
    }

    fn unlike(&self, actor: UserId, recipe_id: RecipeId) -> Result<usize> {
        with_recipe_pair(self, actor, recipe_id, |user, recipe| {
            user.liked_recipes.remove(&recipe_id);
            recipe.liked_by.remove(&actor);
            Ok(recipe.like_count())
        })
    }

    fn save(&self, actor: UserId, recipe_id: RecipeId) -> Result<usize> {
        with_recipe_pair(self, actor, recipe_id, |user, recipe| {
            if recipe.saved_by.contains(&actor) || user.saved_recipes.contains(&recipe_id) {
                return Err(Error::AlreadyExists("Already saved"));
            }
            recipe.saved_by.insert(actor);
            user.saved_recipes.insert(recipe_id);
            Ok(recipe.saved_by.len())
        })
    }

    fn unsave(&self, actor: UserId, recipe_id: RecipeId) -> Result<usize> {
        with_recipe_pair(self, actor, recipe_id, |user, recipe| {
            recipe.saved_by.remove(&actor);
            user.saved_recipes.remove(&recipe_id);
            Ok(recipe.saved_by.len())
        })
    }

    // Leaves `status` alone: publishing here only records the recipe on the
    // actor's profile.
    fn publish(&self, actor: UserId, recipe_id: RecipeId) -> Result<()> {
        with_recipe_pair(self, actor, recipe_id, |user, _| {
            user.published_recipes.insert(recipe_id);
            Ok(())
        })
    }

    fn delete_recipe(&self, actor: UserId, recipe_id: RecipeId) -> Result<()> {
        let users = self.open_tree(USERS)?;
        let recipes = self.open_tree(RECIPES)?;

        // Holders outside likedBy/savedBy/author can only be found by a scan.
        let scanned = referencing_users(&users, recipe_id)?;

        let purged = finish((&users, &recipes).transaction(|(users, recipes)| {
            let recipe = load_recipe(recipes, recipe_id)?;
            if recipe.author != actor {
                return sled::transaction::abort(Error::Forbidden(
                    "Only the owner can delete this",
                ));
            }
            let mut holders = scanned.clone();
            holders.extend(recipe.liked_by.iter().copied());
            holders.extend(recipe.saved_by.iter().copied());
            holders.insert(recipe.author);

            let mut purged = 0;
            for holder in holders {
                if let Some(mut user) = tx_get::<User>(users, holder)? {
                    if references(&user, recipe_id) {
                        forget_recipe(&mut user, recipe_id);
                        tx_put(users, holder, &user)?;
                        purged += 1;
                    }
                }
            }
            recipes.remove(serialize_id(recipe_id))?;
            Ok(purged)
        }))?;
        let purged = purged + purge_stragglers(&users, recipe_id)?;
        debug!(
            "recipe {} deleted, references purged from {} users",
            recipe_id, purged
        );
        Ok(())
    }
}
