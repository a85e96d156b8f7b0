//! # sync-client
//!
//! Async services for the hearth-sync local-first sync engine.
//!
//! This is the library applications use: it keeps a local view of the
//! user's records, reconciles it with the authoritative remote store and
//! forwards local mutations to an external task/calendar provider.
//!
//! ## Features
//!
//! - **Local-first**: saves land in the [`LocalStore`] immediately and are
//!   persisted through a pluggable [`StateStore`]
//! - **Safe reconciliation**: unconfirmed writes survive a merge, deleted
//!   records never reappear ([`TombstoneLedger`])
//! - **Outbound queue**: debounced, coalesced, bounded retries with linear
//!   backoff, persisted across restarts ([`OutboundQueue`])
//! - **Pure State Machine**: uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use hearth_sync_client::{SyncConfig, SyncEngine, TracingSink};
//!
//! let config = SyncConfig::new(OwnerId::new("user-1"));
//! let engine = Arc::new(SyncEngine::new(config, state, remote, adapter, Arc::new(TracingSink)));
//! engine.start().await;
//!
//! // Save locally; synced in the background
//! engine.save(record).await;
//!
//! // Pull the remote snapshot
//! engine.refresh().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod config;
pub mod engine;
pub mod local;
pub mod merge;
pub mod notify;
pub mod queue;
pub mod queue_store;
pub mod refresh;
pub mod remote;
pub mod storage;
pub mod tombstones;

pub use adapter::{AdapterError, MockAdapter, SyncAdapter, SyncReceipt, SyncRequest};
pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use local::{LocalStore, UnsyncedSnapshot};
pub use merge::MergeEngine;
pub use notify::{Notification, NotificationKind, NotificationSink, RecordingSink, TracingSink};
pub use queue::{OutboundQueue, QueueError, QueueTiming, SyncStatusSink};
pub use queue_store::DurableQueueStore;
pub use refresh::{
    spawn_refresh_task, FetchError, ReconciliationTrigger, Refresh, RefreshOutcome, RefreshSummary,
};
pub use remote::{MemoryRemote, RemoteError, RemotePage, RemoteStore, SyncStatus};
pub use storage::{MemoryStore, StateStore, StorageError};
pub use tombstones::TombstoneLedger;
