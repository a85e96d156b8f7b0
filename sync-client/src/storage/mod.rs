//! Key/value persistence boundary.
//!
//! Every durable piece of client state (queue, tombstones, records) is one
//! JSON document under a fixed key. Backends only need to read and replace
//! whole documents; the SQLite backend lives in the `hearth-sync-store`
//! crate.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use hearth_sync_types::persisted::Decoded;
use hearth_sync_types::SyncError;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] SyncError),
}

/// Trait for key/value state backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the document under `key`, `None` if never written.
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the document under `key`.
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Read and decode the document under `key`.
///
/// Missing, unreadable or corrupt documents load as empty and are logged;
/// individually malformed entries are skipped with a warning.
pub(crate) async fn load_document<T>(
    store: &dyn StateStore,
    key: &str,
    decode: impl FnOnce(&str) -> Result<Decoded<T>, SyncError>,
) -> Vec<T> {
    let raw = match store.read(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}; starting empty", key, e);
            return Vec::new();
        }
    };

    match decode(&raw) {
        Ok(decoded) => {
            for reason in &decoded.skipped {
                tracing::warn!("Skipping malformed entry in {}: {}", key, reason);
            }
            decoded.items
        }
        Err(e) => {
            tracing::warn!("Discarding corrupt {}: {}", key, e);
            Vec::new()
        }
    }
}
