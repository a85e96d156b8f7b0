//! # sync-store
//!
//! SQLite persistence for the hearth-sync engine.
//!
//! Implements the client's key/value [`StateStore`] on top of a single
//! `sync_state` table, so the outbound queue, tombstone ledger and local
//! records survive restarts.
//!
//! [`StateStore`]: hearth_sync_client::StateStore

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod sqlite;

pub use error::SqliteStoreError;
pub use sqlite::SqliteStateStore;
