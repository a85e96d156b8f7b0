//! Remote store abstraction.
//!
//! The remote store is the authoritative copy of every record. The engine
//! reads it page by page during reconciliation and writes to it on a
//! best-effort basis when the user saves or deletes.
//!
//! # Contract
//!
//! - `fetch_page()` returns records ordered stably, starting at `cursor`
//!   (an offset) and at most `page_size` long
//! - `upsert()` and `delete()` are idempotent
//! - `update_sync_status()` records the outcome of the outbound sync on an
//!   existing remote copy and fails with [`RemoteError::Rejected`] if there
//!   is none

mod memory;

pub use memory::MemoryRemote;

use async_trait::async_trait;
use hearth_sync_types::{Cursor, OwnerId, Record, RecordId};
use thiserror::Error;

/// Remote store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote could not be reached.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The remote refused the request.
    #[error("remote rejected request: {0}")]
    Rejected(String),

    /// The remote answered with something unreadable.
    #[error("malformed remote response: {0}")]
    Malformed(String),
}

/// One page of a remote snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotePage {
    /// Records in this page.
    pub records: Vec<Record>,
    /// Whether more pages follow.
    pub has_more: bool,
}

/// Outcome of the outbound sync, mirrored onto the remote copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Delivered; carries the provider id when one was returned.
    Synced {
        /// Provider-side identifier.
        external_id: Option<String>,
    },
    /// Retries used up.
    Failed {
        /// Last error.
        error: String,
    },
}

/// Remote store trait.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one page of the owner's records.
    async fn fetch_page(
        &self,
        owner: &OwnerId,
        cursor: Cursor,
        page_size: usize,
    ) -> Result<RemotePage, RemoteError>;

    /// Create or replace a record.
    async fn upsert(&self, record: &Record) -> Result<(), RemoteError>;

    /// Delete a record. Deleting an unknown id succeeds.
    async fn delete(&self, id: &RecordId) -> Result<(), RemoteError>;

    /// Record the outcome of the outbound sync on the remote copy.
    ///
    /// Fails if the remote has no copy of the record.
    async fn update_sync_status(&self, id: &RecordId, status: &SyncStatus)
        -> Result<(), RemoteError>;
}
