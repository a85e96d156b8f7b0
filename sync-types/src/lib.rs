//! # sync-types
//!
//! Shared data types for the hearth-sync local-first sync engine.
//!
//! This crate provides the foundational types used across all hearth-sync crates:
//! - [`RecordId`], [`OwnerId`], [`Cursor`] - Identity and paging types
//! - [`Record`] - The user record (note, task, calendar item)
//! - [`SyncJob`], [`SyncOptions`] - Outbound sync jobs with tagged options
//! - [`persisted`] - Versioned on-disk formats
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod job;
pub mod persisted;
mod record;

pub use error::SyncError;
pub use ids::{Cursor, OwnerId, RecordId};
pub use job::{
    EventSyncOptions, ResourceKind, SyncJob, SyncOperation, SyncOptions, TaskSyncOptions,
};
pub use record::{now_millis, Record, RecordKind};
