use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::cache::{AnyCache, FileCache, MemoryCache};
use crate::dashboard::Locale;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    /// Directory of the snapshot cache file; in-memory caching when unset.
    pub cache_dir: Option<PathBuf>,
    pub locale: Locale,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            cache_dir: None,
            locale: Locale::default(),
        }
    }
}

impl Config {
    /// Reads `TRACKER_*` variables, after loading a `.env` file if present.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_url: try_load(&lookup, "TRACKER_API_URL", DEFAULT_API_URL.to_string()),
            cache_dir: lookup("TRACKER_CACHE_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            locale: try_load(&lookup, "TRACKER_LOCALE", Locale::default()),
        }
    }

    /// Whether snapshots outlive the process.
    pub fn has_persistent_cache(&self) -> bool {
        self.cache_dir.is_some()
    }

    pub fn cache(&self) -> AnyCache {
        match &self.cache_dir {
            Some(dir) => AnyCache::File(FileCache::new(dir)),
            None => AnyCache::Memory(MemoryCache::new()),
        }
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        info!("{key} not set, using default: {default:?}");
        return default;
    };

    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value: {e}; using default: {default:?}");
        default
    })
}
