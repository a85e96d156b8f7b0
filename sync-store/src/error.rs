//! Error types for sync-store.

use std::path::PathBuf;

/// Errors opening or migrating the SQLite database.
#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The database path is not valid UTF-8.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

impl From<SqliteStoreError> for hearth_sync_client::StorageError {
    fn from(err: SqliteStoreError) -> Self {
        hearth_sync_client::StorageError::Backend(err.to_string())
    }
}
