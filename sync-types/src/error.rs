//! Error types for hearth-sync.

use thiserror::Error;

/// Errors that can occur while encoding or validating shared sync types.
#[derive(Debug, Error)]
pub enum SyncError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Persisted document has a schema version this build does not read
    #[error("unsupported schema version: {0}")]
    UnsupportedVersion(u64),

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
