//! Trained Model Storage
//!
//! Bundles are persisted as opaque serde_json blobs in a Sled embedded database.
//! Key format: `{component}/{bundle}` (see `config::defaults`).
//!
//! Models only see the `BundleStore` trait, so any key/value store can stand
//! in for Sled.

use serde::{de::DeserializeOwned, Serialize};
use sled::Db;
use std::path::Path;
use tracing::debug;

/// Storage error types
#[derive(Debug)]
pub enum StorageError {
    /// Sled database error
    Database(sled::Error),
    /// Serialization error (also raised for corrupt blobs on load)
    Serialization(serde_json::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err)
    }
}

/// Key/value seam between trained models and persistence.
pub trait BundleStore: Send + Sync {
    fn save_blob(&self, key: &str, blob: &[u8]) -> Result<(), StorageError>;

    /// `Ok(None)` when nothing was ever saved under `key`.
    fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Serialize a bundle and store it under `key`.
pub fn save_bundle<T: Serialize>(
    store: &dyn BundleStore,
    key: &str,
    bundle: &T,
) -> Result<(), StorageError> {
    let blob = serde_json::to_vec(bundle)?;
    store.save_blob(key, &blob)
}

/// Load and decode a bundle. A blob that fails to decode is reported as
/// `StorageError::Serialization`.
pub fn load_bundle<T: DeserializeOwned>(
    store: &dyn BundleStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.load_blob(key)? {
        Some(blob) => Ok(Some(serde_json::from_slice(&blob)?)),
        None => Ok(None),
    }
}

/// Sled-backed persistent model storage
pub struct ModelStorage {
    db: Db,
}

impl ModelStorage {
    /// Open or create the model database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open a throwaway database that is deleted on drop
    pub fn open_temporary() -> Result<Self, StorageError> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Ok(Self { db })
    }

    pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.db.remove(key.as_bytes())?.is_some())
    }

    /// Get count of stored bundles
    pub fn count(&self) -> usize {
        self.db.len()
    }

    /// Flush any pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl BundleStore for ModelStorage {
    fn save_blob(&self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.db.insert(key.as_bytes(), blob)?;
        self.db.flush()?;
        debug!(key = %key, bytes = blob.len(), "Stored model bundle");
        Ok(())
    }

    fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get(key.as_bytes())?.map(|v| v.to_vec()))
    }
}
