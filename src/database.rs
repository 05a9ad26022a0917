use crate::error::{Error, Result};
use crate::model::*;
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionResult, TransactionalTree, Transactional,
};
use sled::IVec;

pub const USERS: &[u8] = b"users";
pub const USERS_USERNAME: &[u8] = b"users_username";
pub const USERS_EMAIL: &[u8] = b"users_email";
pub const RECIPES: &[u8] = b"recipes";
pub const SESSIONS: &[u8] = b"sessions";

pub type TxResult<T> = ConflictableTransactionResult<T, Error>;

/// Ids are stored big-endian so that tree order matches `generate_id` order.
pub fn serialize_id(id: u64) -> IVec {
    IVec::from(&id.to_be_bytes()[..])
}

pub fn deserialize_id<V: AsRef<[u8]>>(id: V) -> Result<u64> {
    let bytes: [u8; 8] = id
        .as_ref()
        .try_into()
        .map_err(|_| Error::Internal("malformed id key"))?;
    Ok(u64::from_be_bytes(bytes))
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

pub fn tx_get<T: DeserializeOwned>(tree: &TransactionalTree, id: u64) -> TxResult<Option<T>> {
    match tree.get(serialize_id(id))? {
        Some(bytes) => decode(&bytes)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

pub fn tx_put<T: Serialize>(tree: &TransactionalTree, id: u64, value: &T) -> TxResult<()> {
    let bytes = encode(value).map_err(ConflictableTransactionError::Abort)?;
    tree.insert(serialize_id(id), bytes)?;
    Ok(())
}

/// Flattens a transaction outcome into the crate error.
pub fn finish<T>(result: TransactionResult<T, Error>) -> Result<T> {
    result.map_err(|err| match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => Error::Storage(e),
    })
}

fn get_record<T: DeserializeOwned>(tree: &sled::Tree, id: u64) -> Result<Option<T>> {
    tree.get(serialize_id(id))?
        .map(|bytes| decode(&bytes))
        .transpose()
}

fn lookup_index(db: &sled::Db, index: &[u8], key: &str) -> Result<Option<(UserId, User)>> {
    let index = db.open_tree(index)?;
    let users = db.open_tree(USERS)?;
    if let Some(id) = index.get(key.as_bytes())? {
        let user = users
            .get(&id)?
            .ok_or(Error::Internal("dangling user index entry"))?;
        Ok(Some((deserialize_id(id)?, decode(&user)?)))
    } else {
        Ok(None)
    }
}

/// Profile fields a user may change about themselves. Empty values are
/// ignored.
#[derive(Debug, Default, Clone)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub profile_image: Option<String>,
    pub bio: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|v| !v.trim().is_empty())
}

pub trait UserDb {
    fn add_user(&self, user: &User) -> Result<Option<UserId>>;
    fn get_user(&self, id: UserId) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<(UserId, User)>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<(UserId, User)>>;
    fn username_taken(&self, username: &str) -> Result<bool>;
    fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User>;
}

impl UserDb for sled::Db {
    /// Returns `None` when the username or email is already registered.
    fn add_user(&self, user: &User) -> Result<Option<UserId>> {
        let users = self.open_tree(USERS)?;
        let users_username = self.open_tree(USERS_USERNAME)?;
        let users_email = self.open_tree(USERS_EMAIL)?;
        let id = self.generate_id()?;
        let bytes = encode(user)?;
        let result: TransactionResult<(), ()> = (&users, &users_username, &users_email)
            .transaction(|(users, users_username, users_email)| {
                users.insert(serialize_id(id), bytes.clone())?;
                if users_username
                    .insert(user.username.as_bytes(), serialize_id(id))?
                    .is_some()
                {
                    return sled::transaction::abort(());
                }
                if users_email
                    .insert(user.email.as_bytes(), serialize_id(id))?
                    .is_some()
                {
                    return sled::transaction::abort(());
                }
                Ok(())
            });
        match result {
            Ok(()) => Ok(Some(id)),
            Err(TransactionError::Abort(())) => Ok(None),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>> {
        get_record(&self.open_tree(USERS)?, id)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<(UserId, User)>> {
        lookup_index(self, USERS_USERNAME, username)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<(UserId, User)>> {
        lookup_index(self, USERS_EMAIL, email)
    }

    fn username_taken(&self, username: &str) -> Result<bool> {
        Ok(self.open_tree(USERS_USERNAME)?.contains_key(username.as_bytes())?)
    }

    fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User> {
        let users = self.open_tree(USERS)?;
        let users_username = self.open_tree(USERS_USERNAME)?;
        finish((&users, &users_username).transaction(|(users, users_username)| {
            let mut user: User = match tx_get(users, id)? {
                Some(user) => user,
                None => return sled::transaction::abort(Error::NotFound("User")),
            };
            if let Some(username) = non_empty(&update.username) {
                if *username != user.username {
                    if users_username.get(username.as_bytes())?.is_some() {
                        return sled::transaction::abort(Error::AlreadyExists(
                            "Username already taken",
                        ));
                    }
                    users_username.remove(user.username.as_bytes())?;
                    users_username.insert(username.as_bytes(), serialize_id(id))?;
                    user.username = username.clone();
                }
            }
            if let Some(full_name) = non_empty(&update.full_name) {
                user.full_name = full_name.clone();
            }
            if let Some(profile_image) = non_empty(&update.profile_image) {
                user.profile_image = profile_image.clone();
            }
            if let Some(bio) = non_empty(&update.bio) {
                user.bio = bio.clone();
            }
            tx_put(users, id, &user)?;
            Ok(user)
        }))
    }
}

/// Iterates recipes in creation order; reverse it for newest first.
pub struct RecipeIter {
    inner: sled::Iter,
}

fn decode_entry(entry: sled::Result<(IVec, IVec)>) -> Result<(RecipeId, Recipe)> {
    let (key, value) = entry?;
    Ok((deserialize_id(key)?, decode(&value)?))
}

impl Iterator for RecipeIter {
    type Item = Result<(RecipeId, Recipe)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(decode_entry)
    }
}

impl DoubleEndedIterator for RecipeIter {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(decode_entry)
    }
}

pub trait RecipeDb {
    fn add_recipe(&self, recipe: &Recipe) -> Result<RecipeId>;
    fn get_recipe(&self, id: RecipeId) -> Result<Option<Recipe>>;
    fn recipes(&self) -> Result<RecipeIter>;
    fn recipes_by_author(&self, author: UserId) -> Result<Vec<(RecipeId, Recipe)>>;
    /// Applies `edit` to a stored recipe inside a transaction and returns the
    /// result. Errors returned by `edit` abort without writing.
    fn update_recipe<F>(&self, id: RecipeId, edit: F) -> Result<Recipe>
    where
        F: Fn(&mut Recipe) -> Result<()>;
}

impl RecipeDb for sled::Db {
    fn add_recipe(&self, recipe: &Recipe) -> Result<RecipeId> {
        let recipes = self.open_tree(RECIPES)?;
        let id = self.generate_id()?;
        recipes.insert(serialize_id(id), encode(recipe)?)?;
        Ok(id)
    }

    fn get_recipe(&self, id: RecipeId) -> Result<Option<Recipe>> {
        get_record(&self.open_tree(RECIPES)?, id)
    }

    fn recipes(&self) -> Result<RecipeIter> {
        Ok(RecipeIter {
            inner: self.open_tree(RECIPES)?.iter(),
        })
    }

    fn recipes_by_author(&self, author: UserId) -> Result<Vec<(RecipeId, Recipe)>> {
        let mut found = Vec::new();
        for entry in self.recipes()? {
            let (id, recipe) = entry?;
            if recipe.author == author {
                found.push((id, recipe));
            }
        }
        Ok(found)
    }

    fn update_recipe<F>(&self, id: RecipeId, edit: F) -> Result<Recipe>
    where
        F: Fn(&mut Recipe) -> Result<()>,
    {
        let recipes = self.open_tree(RECIPES)?;
        finish(recipes.transaction(|recipes| {
            let mut recipe: Recipe = match tx_get(recipes, id)? {
                Some(recipe) => recipe,
                None => return sled::transaction::abort(Error::NotFound("Recipe")),
            };
            edit(&mut recipe).map_err(ConflictableTransactionError::Abort)?;
            tx_put(recipes, id, &recipe)?;
            Ok(recipe)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{recipe, temp_db, user};

    #[test]
    fn ids_round_trip_in_order() {
        assert_eq!(deserialize_id(serialize_id(42)).unwrap(), 42);
        assert!(serialize_id(255) < serialize_id(256));
        assert!(deserialize_id(b"short").is_err());
    }

    #[test]
    fn duplicate_username_or_email_is_rejected() {
        let db = temp_db();
        let alice = db.add_user(&user("alice")).unwrap();
        assert!(alice.is_some());

        assert_eq!(db.add_user(&user("alice")).unwrap(), None);

        let mut same_email = user("alicia");
        same_email.email = "alice@example.com".to_owned();
        assert_eq!(db.add_user(&same_email).unwrap(), None);
        assert!(!db.username_taken("alicia").unwrap());
    }

    #[test]
    fn lookup_by_username_and_email() {
        let db = temp_db();
        let id = db.add_user(&user("bob")).unwrap().unwrap();
        let (by_name, _) = db.get_user_by_username("bob").unwrap().unwrap();
        let (by_email, found) = db.get_user_by_email("bob@example.com").unwrap().unwrap();
        assert_eq!(by_name, id);
        assert_eq!(by_email, id);
        assert_eq!(found.username, "bob");
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn renaming_moves_the_username_index() {
        let db = temp_db();
        let id = db.add_user(&user("carol")).unwrap().unwrap();
        db.add_user(&user("dave")).unwrap().unwrap();

        let taken = ProfileUpdate {
            username: Some("dave".to_owned()),
            ..ProfileUpdate::default()
        };
        assert!(matches!(
            db.update_profile(id, &taken),
            Err(Error::AlreadyExists(_))
        ));

        let update = ProfileUpdate {
            username: Some("caroline".to_owned()),
            bio: Some("   ".to_owned()),
            full_name: Some("Carol C".to_owned()),
            ..ProfileUpdate::default()
        };
        let updated = db.update_profile(id, &update).unwrap();
        assert_eq!(updated.username, "caroline");
        assert_eq!(updated.full_name, "Carol C");
        assert_eq!(updated.bio, "");
        assert!(!db.username_taken("carol").unwrap());
        assert_eq!(db.get_user_by_username("caroline").unwrap().unwrap().0, id);
    }

    #[test]
    fn recipes_iterate_in_creation_order() {
        let db = temp_db();
        let ids: Vec<RecipeId> = (0..300)
            .map(|n| {
                db.add_recipe(&recipe(1, &format!("r{}", n), Status::Published))
                    .unwrap()
            })
            .collect();
        let stored: Vec<RecipeId> = db.recipes().unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(stored, ids);
        let newest = db.recipes().unwrap().rev().next().unwrap().unwrap();
        assert_eq!(newest.0, *ids.last().unwrap());
    }

    #[test]
    fn update_recipe_aborts_on_edit_error() {
        let db = temp_db();
        let id = db.add_recipe(&recipe(1, "Soup", Status::Draft)).unwrap();
        let result = db.update_recipe(id, |r| {
            r.title = "Changed".to_owned();
            Err(Error::Forbidden("no"))
        });
        assert!(matches!(result, Err(Error::Forbidden(_))));
        assert_eq!(db.get_recipe(id).unwrap().unwrap().title, "Soup");
        assert!(matches!(
            db.update_recipe(id + 1000, |_| Ok(())),
            Err(Error::NotFound("Recipe"))
        ));
    }
}
