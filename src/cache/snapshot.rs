// src/cache/snapshot.rs

//! Durable storage for cache generations.
//!
//! The on-disk form is a JSON state file whose `cache` key holds the
//! serialized [`CacheGeneration`]. Other top-level keys belong to other
//! tools and are carried over untouched on every write.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cache::record::CacheGeneration;
use crate::fs::FileSystem;

/// Relative path (from the project root) of the default state file.
pub const STATE_FILE_PATH: &str = ".buildrelay/state.json";

const CACHE_KEY: &str = "cache";

/// Abstract storage for the persisted cache generation.
pub trait SnapshotStore: Send + Sync {
    /// Load the last persisted generation, `Ok(None)` if nothing was stored.
    fn load(&self) -> Result<Option<CacheGeneration>>;
    fn save(&mut self, generation: &CacheGeneration) -> Result<()>;
}

/// Stores the generation in a JSON state file.
pub struct FileSnapshotStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    fn read_state(&self) -> Result<Option<Map<String, Value>>> {
        if !self.fs.exists(&self.path) {
            return Ok(None);
        }

        let contents = self.fs.read_to_string(&self.path)?;
        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("parsing state file {:?}", self.path))?;

        match value {
            Value::Object(map) => Ok(Some(map)),
            other => anyhow::bail!(
                "state file {:?} must hold a JSON object, found {}",
                self.path,
                json_kind(&other)
            ),
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<CacheGeneration>> {
        let Some(mut state) = self.read_state()? else {
            debug!(path = ?self.path, "no state file");
            return Ok(None);
        };

        match state.remove(CACHE_KEY) {
            Some(cache) => {
                let generation: CacheGeneration = serde_json::from_value(cache)
                    .with_context(|| format!("decoding cache from {:?}", self.path))?;
                Ok(Some(generation))
            }
            None => Ok(None),
        }
    }

    fn save(&mut self, generation: &CacheGeneration) -> Result<()> {
        let mut state = match self.read_state() {
            Ok(Some(state)) => state,
            Ok(None) => Map::new(),
            Err(err) => {
                warn!(path = ?self.path, error = %err, "existing state file unreadable; rewriting it");
                Map::new()
            }
        };

        state.insert(CACHE_KEY.to_string(), serde_json::to_value(generation)?);
        let bytes = serde_json::to_vec_pretty(&Value::Object(state))?;
        self.fs.write_atomic(&self.path, &bytes)?;

        info!(path = ?self.path, files = generation.len(), "wrote cache snapshot");
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Keeps the generation in memory only (lost on restart).
///
/// Clones share the same slot, so a test can persist through one cache and
/// reload through another.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Arc<Mutex<Option<CacheGeneration>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently stored generation, if any.
    pub fn stored(&self) -> Option<CacheGeneration> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<CacheGeneration>> {
        Ok(self.stored())
    }

    fn save(&mut self, generation: &CacheGeneration) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(generation.clone());
        debug!(files = generation.len(), "stored cache snapshot (memory)");
        Ok(())
    }
}
