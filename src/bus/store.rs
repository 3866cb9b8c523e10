//! Durable key-value backing for the state bus

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;

/// Persisted key/value pairs, keyed by the bus key name
pub type StoredEntries = BTreeMap<String, Value>;

/// Storage technology behind the state bus. Implementations are called from
/// the store-writer task's blocking pool, never from the control loop.
pub trait KeyValueStore: Send + Sync + 'static {
    fn load(&self) -> Result<StoredEntries, StoreError>;
    fn save(&self, entries: &StoredEntries) -> Result<(), StoreError>;
}

/// Whole-map JSON file, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn load(&self) -> Result<StoredEntries, StoreError> {
        if !self.path.exists() {
            debug!("State file {} does not exist yet", self.path.display());
            return Ok(StoredEntries::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(StoredEntries::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, entries: &StoredEntries) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<StoredEntries>,
}

impl MemoryStore {
    pub fn new(entries: StoredEntries) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn entries(&self) -> StoredEntries {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self) -> Result<StoredEntries, StoreError> {
        Ok(self.entries())
    }

    fn save(&self, entries: &StoredEntries) -> Result<(), StoreError> {
        *self.entries.lock().unwrap_or_else(PoisonError::into_inner) = entries.clone();
        Ok(())
    }
}
