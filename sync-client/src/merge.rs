//! Merge engine: applies a remote snapshot to the local store.
//!
//! Runs the pure [`reconcile`] over the local unsynced records, the
//! tombstone ledger and the pending-delete set, writes the result into the
//! [`LocalStore`] and prunes confirmed tombstones. The whole computation
//! runs between two awaits, so no local write can interleave with it.

use crate::local::LocalStore;
use crate::tombstones::TombstoneLedger;
use hearth_sync_core::{live_remote_ids, reconcile, MergeReport};
use hearth_sync_types::{Record, RecordId};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Applies complete remote snapshots to local state.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    local: Arc<LocalStore>,
    ledger: Arc<TombstoneLedger>,
}

impl MergeEngine {
    /// Create a merge engine over the local store and tombstone ledger.
    pub fn new(local: Arc<LocalStore>, ledger: Arc<TombstoneLedger>) -> Self {
        Self { local, ledger }
    }

    /// Merge a complete remote snapshot into local state.
    ///
    /// `pending_deletes` are ids with a delete job still queued. Persistence
    /// failures are logged; the in-memory view is updated regardless.
    pub async fn apply(&self, remote: &[Record], pending_deletes: BTreeSet<RecordId>) -> MergeReport {
        let snapshot = self.local.snapshot_unsynced();
        let mut excluded = self.ledger.all();
        excluded.extend(pending_deletes);

        let result = reconcile(remote, &snapshot.records, &excluded);
        let report = result.report;
        let count = result.records.len();

        if let Err(e) = self.local.apply_merge(result.records, snapshot.mark).await {
            tracing::warn!("Failed to persist merged records: {}", e);
        }
        if let Err(e) = self.ledger.prune(&live_remote_ids(remote)).await {
            tracing::warn!("Failed to persist pruned tombstones: {}", e);
        }

        tracing::debug!(
            "Merged {} remote records into {} (kept local {}, superseded {}, suppressed {})",
            remote.len(),
            count,
            report.kept_local.len(),
            report.superseded.len(),
            report.suppressed.len()
        );
        report
    }
}
