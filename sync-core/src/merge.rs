//! Merge of a remote snapshot with unconfirmed local state.
//!
//! # Algorithm
//!
//! 1. Collapse the remote snapshot to one copy per id (newest `updated_at`).
//! 2. `merged = remote ∪ { local unsynced records whose id the remote does not know }`.
//!    When both sides have an id the remote copy wins and `unsynced` is cleared.
//! 3. Drop every excluded id (tombstones ∪ pending deletes).
//!
//! Remote copies carrying `deleted_at` confirm a delete: they are not part
//! of the view, they still supersede a local unsynced copy, and they do not
//! count as "present" when pruning tombstones (see [`live_remote_ids`]).
//!
//! Remote-wins is a deliberate record-level last-write-wins policy. An
//! offline edit that raced a remote write is replaced by the remote copy;
//! there is no field-level merging.
//!
//! The merge is a pure function: the same inputs always produce the same
//! output, ordered by id.

use hearth_sync_types::{Record, RecordId};
use std::collections::{BTreeMap, BTreeSet};

/// What the merge did, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Local unsynced records kept because the remote has no copy yet.
    pub kept_local: Vec<RecordId>,
    /// Local unsynced records replaced by the remote copy.
    pub superseded: Vec<RecordId>,
    /// Ids removed from the view because they are tombstoned or pending delete.
    pub suppressed: Vec<RecordId>,
    /// Ids the remote reports as soft-deleted.
    pub remote_deleted: Vec<RecordId>,
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    /// The new canonical view, ordered by id.
    pub records: Vec<Record>,
    /// What happened along the way.
    pub report: MergeReport,
}

/// Merge a complete remote snapshot with local unsynced records.
///
/// `excluded` is the union of the tombstone ledger and the pending-delete
/// set; none of those ids appear in the result, whatever the remote says.
pub fn reconcile(
    remote: &[Record],
    local_unsynced: &[Record],
    excluded: &BTreeSet<RecordId>,
) -> MergeResult {
    let mut report = MergeReport::default();
    let latest = collapse(remote);

    let mut merged: BTreeMap<RecordId, Record> = BTreeMap::new();
    for (id, record) in &latest {
        if record.is_deleted() {
            report.remote_deleted.push(id.clone());
            continue;
        }
        let mut copy = (*record).clone();
        copy.unsynced = false;
        merged.insert(id.clone(), copy);
    }

    for local in local_unsynced {
        if latest.contains_key(&local.id) {
            report.superseded.push(local.id.clone());
        } else if !merged.contains_key(&local.id) {
            report.kept_local.push(local.id.clone());
            merged.insert(local.id.clone(), local.clone());
        }
    }

    for id in excluded {
        if merged.remove(id).is_some() {
            report.suppressed.push(id.clone());
        }
    }

    report.kept_local.retain(|id| !excluded.contains(id));

    MergeResult {
        records: merged.into_values().collect(),
        report,
    }
}

/// Ids the remote snapshot lists as live (not soft-deleted).
///
/// A tombstone whose id is not in this set can be pruned.
pub fn live_remote_ids(remote: &[Record]) -> BTreeSet<RecordId> {
    collapse(remote)
        .into_iter()
        .filter(|(_, record)| !record.is_deleted())
        .map(|(id, _)| id)
        .collect()
}

/// Pick the copy to keep when the same id is read twice.
///
/// The newer `updated_at` wins; on a tie the later read wins.
pub(crate) fn prefer_newer<'a>(existing: &'a Record, candidate: &'a Record) -> &'a Record {
    if candidate.updated_at >= existing.updated_at {
        candidate
    } else {
        existing
    }
}

fn collapse(remote: &[Record]) -> BTreeMap<RecordId, &Record> {
    let mut latest: BTreeMap<RecordId, &Record> = BTreeMap::new();
    for record in remote {
        let chosen = match latest.get(&record.id) {
            Some(existing) => prefer_newer(existing, record),
            None => record,
        };
        latest.insert(record.id.clone(), chosen);
    }
    latest
}
