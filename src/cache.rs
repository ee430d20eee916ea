use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::models::StateSnapshot;

/// Storage key the whole snapshot is kept under.
pub const CACHE_KEY: &str = "app_data_cache";

/// Session-scoped storage for the serialized snapshot.
pub trait SnapshotCache {
    fn load(&self) -> Result<Option<StateSnapshot>>;
    fn save(&self, snapshot: &StateSnapshot) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores nothing; every load is a miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl SnapshotCache for NoCache {
    fn load(&self) -> Result<Option<StateSnapshot>> {
        Ok(None)
    }

    fn save(&self, _snapshot: &StateSnapshot) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process JSON blob. Clones share the blob, so a second store built from
/// a clone sees what the first one committed, like a page reload would.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    blob: Arc<Mutex<Option<String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored JSON, if any.
    pub fn raw(&self) -> Option<String> {
        self.blob.lock().ok().and_then(|blob| blob.clone())
    }

    /// Overwrites the stored JSON verbatim.
    pub fn put_raw(&self, json: impl Into<String>) -> Result<()> {
        let mut blob = self
            .blob
            .lock()
            .map_err(|_| anyhow!("memory cache lock poisoned"))?;
        *blob = Some(json.into());
        Ok(())
    }
}

impl SnapshotCache for MemoryCache {
    fn load(&self) -> Result<Option<StateSnapshot>> {
        match self.raw() {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).context("failed to parse cached snapshot")?,
            )),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        self.put_raw(serde_json::to_string(snapshot)?)
    }

    fn clear(&self) -> Result<()> {
        let mut blob = self
            .blob
            .lock()
            .map_err(|_| anyhow!("memory cache lock poisoned"))?;
        *blob = None;
        Ok(())
    }
}

/// JSON file `<dir>/app_data_cache.json`.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{CACHE_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotCache for FileCache {
    fn load(&self) -> Result<Option<StateSnapshot>> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let snapshot = serde_json::from_slice(&bytes)
                    .with_context(|| format!("failed to parse {}", self.path.display()))?;
                debug!("loaded cached snapshot from {}", self.path.display());
                Ok(Some(snapshot))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        }
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&self.path, payload)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", self.path.display()))
            }
        }
    }
}

/// Cache chosen at runtime from configuration.
#[derive(Debug, Clone)]
pub enum AnyCache {
    Memory(MemoryCache),
    File(FileCache),
}

impl SnapshotCache for AnyCache {
    fn load(&self) -> Result<Option<StateSnapshot>> {
        match self {
            AnyCache::Memory(cache) => cache.load(),
            AnyCache::File(cache) => cache.load(),
        }
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        match self {
            AnyCache::Memory(cache) => cache.save(snapshot),
            AnyCache::File(cache) => cache.save(snapshot),
        }
    }

    fn clear(&self) -> Result<()> {
        match self {
            AnyCache::Memory(cache) => cache.clear(),
            AnyCache::File(cache) => cache.clear(),
        }
    }
}
