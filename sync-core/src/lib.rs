//! # sync-core
//!
//! Pure logic for hearth-sync (no I/O, instant tests).
//!
//! This crate implements the merge algorithm and the state machines of the
//! outbound queue without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (timers, adapter calls, persistence) is performed by
//! `sync-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod job_state;
pub mod job_table;
pub mod merge;
pub mod reminder;
pub mod snapshot;
pub mod tombstone;

pub use job_state::{JobAction, JobEvent, JobPhase, RetryDecision, RetryPolicy};
pub use job_table::{JobTable, QueuedJob, Transition};
pub use merge::{live_remote_ids, reconcile, MergeReport, MergeResult};
pub use reminder::{DueReminder, ReminderGate};
pub use snapshot::{SnapshotAccumulator, SnapshotError};
pub use tombstone::TombstoneSet;
