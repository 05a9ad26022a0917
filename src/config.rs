use chrono::Duration;
use log::{info, warn};
use std::{env, fmt::Display, path::PathBuf, str::FromStr};

pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

pub struct Config {
    pub bind: String,
    pub db_path: PathBuf,
    pub token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub public_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "0.0.0.0:5000".to_owned(),
            db_path: PathBuf::from("recipe-share.db"),
            token_ttl: Duration::days(7),
            bcrypt_cost: 10,
            public_url: "http://localhost:3000".to_owned(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let defaults = Config::default();
        let bcrypt_cost = try_load("RECIPE_SHARE_BCRYPT_COST", defaults.bcrypt_cost);
        let bcrypt_cost = if (MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&bcrypt_cost) {
            bcrypt_cost
        } else {
            warn!(
                "RECIPE_SHARE_BCRYPT_COST must be between {} and {}, using default: {}",
                MIN_BCRYPT_COST,
                MAX_BCRYPT_COST,
                defaults.bcrypt_cost
            );
            defaults.bcrypt_cost
        };
        let token_ttl = Duration::try_days(try_load("RECIPE_SHARE_TOKEN_TTL_DAYS", 7i64))
            .filter(|ttl| *ttl > Duration::zero())
            .unwrap_or_else(|| {
                warn!("RECIPE_SHARE_TOKEN_TTL_DAYS out of range, using default: 7");
                defaults.token_ttl
            });
        Config {
            bind: try_load("RECIPE_SHARE_BIND", defaults.bind),
            db_path: try_load("RECIPE_SHARE_DB", defaults.db_path),
            token_ttl,
            bcrypt_cost,
            public_url: try_load("RECIPE_SHARE_PUBLIC_URL", defaults.public_url),
        }
    }

    pub fn share_link(&self, recipe: u64) -> String {
        format!("{}/recipe/{}", self.public_url.trim_end_matches('/'), recipe)
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            warn!("Invalid {} value {:?}: {}, using default: {:?}", key, value, e, default);
            default
        }),
        Err(_) => {
            info!("{} not set, using default: {:?}", key, default);
            default
        }
    }
}
