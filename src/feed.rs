use crate::database::RecipeDb;
use crate::error::Result;
use crate::model::*;
use crate::view::{recipe_card, RecipeCard};

/// Size of the trending, recent and search windows.
pub const FEED_WINDOW: usize = 20;
pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    /// Unparseable or non-positive values fall back to the defaults.
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        fn positive(value: Option<&str>, default: usize) -> usize {
            value
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        }
        Page {
            page: positive(page, DEFAULT_PAGE),
            limit: positive(limit, DEFAULT_LIMIT),
        }
    }

    fn skip(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Orders by like count, newest first among equals.
pub fn rank_trending(window: &mut [(RecipeId, Recipe)]) {
    window.sort_by(|(_, a), (_, b)| {
        b.like_count()
            .cmp(&a.like_count())
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// Case-insensitive substring match on title or description. `needle` must
/// already be lowercase.
pub fn matches_query(recipe: &Recipe, needle: &str) -> bool {
    recipe.title.to_lowercase().contains(needle)
        || recipe.description.to_lowercase().contains(needle)
}

pub trait Feeds {
    fn published_feed(&self, page: Page) -> Result<Vec<RecipeCard>>;
    fn trending_feed(&self) -> Result<Vec<RecipeCard>>;
    fn recent_feed(&self) -> Result<Vec<RecipeCard>>;
    fn search(&self, query: &str) -> Result<Vec<RecipeCard>>;
}

fn newest_published(db: &sled::Db) -> Result<Vec<(RecipeId, Recipe)>> {
    let mut window = Vec::with_capacity(FEED_WINDOW);
    for entry in db.recipes()?.rev() {
        let (id, recipe) = entry?;
        if recipe.is_published() {
            window.push((id, recipe));
            if window.len() == FEED_WINDOW {
                break;
            }
        }
    }
    Ok(window)
}

fn cards(db: &sled::Db, recipes: Vec<(RecipeId, Recipe)>) -> Result<Vec<RecipeCard>> {
    recipes
        .into_iter()
        .map(|(id, recipe)| recipe_card(db, id, recipe))
        .collect()
}

impl Feeds for sled::Db {
    fn published_feed(&self, page: Page) -> Result<Vec<RecipeCard>> {
        let mut selected = Vec::new();
        let mut skipped = 0;
        for entry in self.recipes()? {
            let (id, recipe) = entry?;
            if !recipe.is_published() {
                continue;
            }
            if skipped < page.skip() {
                skipped += 1;
                continue;
            }
            selected.push((id, recipe));
            if selected.len() == page.limit {
                break;
            }
        }
        cards(self, selected)
    }

    /// Only the newest window is ranked, not the whole collection.
    fn trending_feed(&self) -> Result<Vec<RecipeCard>> {
        let mut window = newest_published(self)?;
        rank_trending(&mut window);
        cards(self, window)
    }

    /// Drops recipes whose author is gone, so it may return fewer than
    /// `FEED_WINDOW` items.
    fn recent_feed(&self) -> Result<Vec<RecipeCard>> {
        let window = cards(self, newest_published(self)?)?;
        Ok(window
            .into_iter()
            .filter(|card| card.author.is_some())
            .collect())
    }

    fn search(&self, query: &str) -> Result<Vec<RecipeCard>> {
        let needle = query.to_lowercase();
        let mut found = Vec::new();
        for entry in self.recipes()? {
            let (id, recipe) = entry?;
            if recipe.is_published() && matches_query(&recipe, &needle) {
                found.push((id, recipe));
                if found.len() == FEED_WINDOW {
                    break;
                }
            }
        }
        cards(self, found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Relationships;
    use crate::test_support::{add_aged_recipe, add_recipe, add_user, recipe, temp_db};
    use rstest::rstest;

    #[rstest]
    #[case(None, None, Page { page: 1, limit: 10 })]
    #[case(Some("3"), Some("5"), Page { page: 3, limit: 5 })]
    #[case(Some("0"), Some("-2"), Page { page: 1, limit: 10 })]
    #[case(Some("abc"), Some(" 4 "), Page { page: 1, limit: 4 })]
    fn page_parsing(#[case] page: Option<&str>, #[case] limit: Option<&str>, #[case] expected: Page) {
        assert_eq!(Page::parse(page, limit), expected);
    }

    #[test]
    fn published_feed_paginates_in_store_order() {
        let db = temp_db();
        let carol = add_user(&db, "carol");
        for n in 0..5 {
            add_recipe(&db, carol, &format!("Dish {}", n), Status::Published);
            add_recipe(&db, carol, &format!("Draft {}", n), Status::Draft);
        }
        let first = db.published_feed(Page { page: 1, limit: 2 }).unwrap();
        let titles: Vec<_> = first.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Dish 0", "Dish 1"]);

        let third = db.published_feed(Page { page: 3, limit: 2 }).unwrap();
        let titles: Vec<_> = third.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Dish 4"]);

        assert!(db
            .published_feed(Page { page: 4, limit: 2 })
            .unwrap()
            .is_empty());
        assert_eq!(db.published_feed(Page::default()).unwrap().len(), 5);
    }

    #[test]
    fn trending_is_capped_and_excludes_drafts() {
        let db = temp_db();
        let carol = add_user(&db, "carol");
        for n in 0..30 {
            add_recipe(&db, carol, &format!("Dish {}", n), Status::Published);
            add_recipe(&db, carol, &format!("Draft {}", n), Status::Draft);
        }
        let trending = db.trending_feed().unwrap();
        assert_eq!(trending.len(), FEED_WINDOW);
        assert!(trending.iter().all(|c| c.status == Status::Published));
    }

    #[test]
    fn trending_ranks_only_the_newest_window() {
        let db = temp_db();
        let carol = add_user(&db, "carol");
        let dave = add_user(&db, "dave");
        let old_favourite = add_recipe(&db, carol, "Old favourite", Status::Published);
        db.toggle_like(dave, old_favourite).unwrap();
        db.toggle_like(carol, old_favourite).unwrap();
        let mut newer = Vec::new();
        for n in 0..FEED_WINDOW {
            newer.push(add_recipe(&db, carol, &format!("New {}", n), Status::Published));
        }
        let liked = newer[3];
        db.toggle_like(dave, liked).unwrap();

        let trending = db.trending_feed().unwrap();
        assert!(trending.iter().all(|c| c.id != old_favourite));
        assert_eq!(trending[0].id, liked);
        assert_eq!(trending[0].like_count(), 1);
    }

    #[test]
    fn ranking_breaks_ties_by_recency() {
        let mut older = recipe(1, "Older", Status::Published);
        older.created_at = older.created_at - chrono::Duration::hours(1);
        let newer = recipe(1, "Newer", Status::Published);
        let mut popular = recipe(1, "Popular", Status::Published);
        popular.created_at = popular.created_at - chrono::Duration::hours(2);
        popular.liked_by.insert(9);

        let mut window = vec![(1, older), (2, newer), (3, popular)];
        rank_trending(&mut window);
        let order: Vec<_> = window.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn recent_is_newest_first_and_skips_dangling_authors() {
        let db = temp_db();
        let carol = add_user(&db, "carol");
        let first = add_aged_recipe(&db, carol, "First", Status::Published, 10);
        let orphan = add_recipe(&db, 4242, "Orphan", Status::Published);
        let second = add_recipe(&db, carol, "Second", Status::Published);

        let recent = db.recent_feed().unwrap();
        let ids: Vec<_> = recent.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert!(!ids.contains(&orphan));
    }

    #[rstest]
    #[case("pancake", 1)]
    #[case("PANCAKE", 1)]
    #[case("fluffy", 1)]
    #[case("secret", 0)]
    #[case("", 2)]
    #[case(".*", 0)]
    #[case(" pan", 0)]
    #[case("and quick", 1)]
    fn search_matches_published_titles_and_descriptions(
        #[case] query: &str,
        #[case] expected: usize,
    ) {
        let db = temp_db();
        let carol = add_user(&db, "carol");
        let mut pancakes = recipe(carol, "Pancakes", Status::Published);
        pancakes.description = "Fluffy and quick".to_owned();
        db.add_recipe(&pancakes).unwrap();
        add_recipe(&db, carol, "Soup", Status::Published);
        add_recipe(&db, carol, "Secret stew", Status::Draft);

        assert_eq!(db.search(query).unwrap().len(), expected);
    }

    #[test]
    fn search_is_capped() {
        let db = temp_db();
        let carol = add_user(&db, "carol");
        for n in 0..25 {
            add_recipe(&db, carol, &format!("Curry {}", n), Status::Published);
        }
        assert_eq!(db.search("curry").unwrap().len(), FEED_WINDOW);
    }
}
