//! Key-value storage for scene snapshots.

mod memory;

#[cfg(not(target_arch = "wasm32"))]
mod file;

#[cfg(target_arch = "wasm32")]
mod local;

pub use memory::MemoryStorage;

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(target_arch = "wasm32")]
pub use local::LocalStorage;

use crate::snapshot::{Snapshot, SnapshotError};
use std::rc::Rc;
use thiserror::Error;

/// Key used when an editor does not pick its own.
pub const DEFAULT_SNAPSHOT_KEY: &str = "inkgraph.scene";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Key not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

impl From<SnapshotError> for StorageError {
    fn from(err: SnapshotError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Synchronous string key-value storage.
///
/// Implementations can keep documents in memory, on disk, or in the
/// browser's `localStorage`.
pub trait Storage {
    /// Read a value; `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    fn remove(&self, key: &str) -> StorageResult<()>;

    fn keys(&self) -> StorageResult<Vec<String>>;

    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// A storage handle bound to the key of one editor instance.
#[derive(Clone)]
pub struct Persistence {
    storage: Rc<dyn Storage>,
    key: String,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").field("key", &self.key).finish_non_exhaustive()
    }
}

impl Persistence {
    pub fn new(storage: Rc<dyn Storage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Bind to [`DEFAULT_SNAPSHOT_KEY`].
    pub fn with_default_key(storage: Rc<dyn Storage>) -> Self {
        Self::new(storage, DEFAULT_SNAPSHOT_KEY)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &Rc<dyn Storage> {
        &self.storage
    }

    pub fn save(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let json = snapshot
            .to_json()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.storage.set(&self.key, &json)
    }

    /// Raw snapshot JSON, if any was stored.
    pub fn load_raw(&self) -> StorageResult<Option<String>> {
        self.storage.get(&self.key)
    }

    /// Load and validate the stored snapshot.
    pub fn load(&self) -> StorageResult<Snapshot> {
        let json = self
            .load_raw()?
            .ok_or_else(|| StorageError::NotFound(self.key.clone()))?;
        Ok(Snapshot::from_json(&json)?)
    }

    pub fn clear(&self) -> StorageResult<()> {
        self.storage.remove(&self.key)
    }
}

/// Create the platform's default storage backend.
#[cfg(not(target_arch = "wasm32"))]
pub fn create_default_storage() -> StorageResult<Rc<dyn Storage>> {
    Ok(Rc::new(FileStorage::default_location()?))
}

#[cfg(target_arch = "wasm32")]
pub fn create_default_storage() -> StorageResult<Rc<dyn Storage>> {
    Ok(Rc::new(LocalStorage::new()?))
}
