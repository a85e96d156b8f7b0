//! In-memory tombstone set.
//!
//! A tombstone records that an id was deleted locally and must stay out of
//! the merged view until the remote store stops returning it. This type is
//! the pure half of the tombstone ledger; persistence lives in sync-client.

use hearth_sync_types::RecordId;
use std::collections::BTreeSet;

/// Set of locally-deleted record ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TombstoneSet {
    ids: BTreeSet<RecordId>,
}

impl TombstoneSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a set from persisted ids.
    pub fn from_ids(ids: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Tombstone an id. Returns `false` if it was already tombstoned.
    pub fn add(&mut self, id: RecordId) -> bool {
        self.ids.insert(id)
    }

    /// Lift the tombstone on an id that was recreated locally.
    ///
    /// Returns `false` if it was not tombstoned.
    pub fn remove(&mut self, id: &RecordId) -> bool {
        self.ids.remove(id)
    }

    /// Check whether an id is tombstoned.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.ids.contains(id)
    }

    /// All tombstoned ids.
    pub fn all(&self) -> &BTreeSet<RecordId> {
        &self.ids
    }

    /// Remove every tombstone whose id is not in `remote_ids`.
    ///
    /// Once the remote store no longer lists an id, the delete has been
    /// confirmed and the tombstone has nothing left to suppress. Returns
    /// the pruned ids in order.
    pub fn prune(&mut self, remote_ids: &BTreeSet<RecordId>) -> Vec<RecordId> {
        let pruned: Vec<RecordId> = self.ids.difference(remote_ids).cloned().collect();
        for id in &pruned {
            self.ids.remove(id);
        }
        pruned
    }

    /// Number of tombstones.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if there are no tombstones.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> BTreeSet<RecordId> {
        values.iter().map(|v| RecordId::from(*v)).collect()
    }

    #[test]
    fn add_is_idempotent() {
        let mut set = TombstoneSet::new();
        assert!(set.add(RecordId::from("a")));
        assert!(!set.add(RecordId::from("a")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_lifts_only_that_tombstone() {
        let mut set = TombstoneSet::from_ids(ids(&["a", "b"]));

        assert!(set.remove(&RecordId::from("a")));
        assert!(!set.remove(&RecordId::from("a")));

        assert_eq!(set.all(), &ids(&["b"]));
    }

    #[test]
    fn prune_keeps_ids_still_listed_remotely() {
        let mut set = TombstoneSet::from_ids(ids(&["a", "b", "c"]));

        let pruned = set.prune(&ids(&["b", "z"]));

        assert_eq!(pruned, vec![RecordId::from("a"), RecordId::from("c")]);
        assert!(set.contains(&RecordId::from("b")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn prune_twice_is_a_no_op() {
        let mut set = TombstoneSet::from_ids(ids(&["a", "b"]));
        let remote = ids(&["a"]);

        set.prune(&remote);
        let second = set.prune(&remote);

        assert!(second.is_empty());
        assert_eq!(set.all(), &ids(&["a"]));
    }

    #[test]
    fn prune_against_empty_snapshot_clears_everything() {
        let mut set = TombstoneSet::from_ids(ids(&["a", "b"]));
        set.prune(&BTreeSet::new());
        assert!(set.is_empty());
    }
}
