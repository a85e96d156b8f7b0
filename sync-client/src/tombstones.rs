//! Tombstone ledger.
//!
//! Wraps the pure [`TombstoneSet`] with persistence. `add()` inserts into
//! memory before its first await point, so a delete is suppressed from every
//! merge that starts after the call, even if the persist is still running.

use crate::storage::{load_document, StateStore, StorageError};
use hearth_sync_core::TombstoneSet;
use hearth_sync_types::persisted::{decode_tombstones, encode_tombstones, TOMBSTONE_STORAGE_KEY};
use hearth_sync_types::RecordId;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Persisted set of locally-deleted record ids.
pub struct TombstoneLedger {
    set: Mutex<TombstoneSet>,
    store: Arc<dyn StateStore>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl TombstoneLedger {
    /// Create an empty ledger over a state backend.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            set: Mutex::new(TombstoneSet::new()),
            store,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Restore persisted tombstones, merging with any added since startup.
    ///
    /// Returns the number of tombstones held afterwards.
    pub async fn load(&self) -> usize {
        let ids = load_document(self.store.as_ref(), TOMBSTONE_STORAGE_KEY, decode_tombstones).await;
        let mut set = self.lock();
        for id in ids {
            set.add(id);
        }
        tracing::debug!("Loaded {} tombstones", set.len());
        set.len()
    }

    /// Tombstone an id, then persist.
    ///
    /// The in-memory insert happens before the first suspension point.
    /// Returns `false` if the id was already tombstoned (nothing persisted).
    pub async fn add(&self, id: RecordId) -> Result<bool, StorageError> {
        let inserted = self.lock().add(id);
        if inserted {
            self.persist().await?;
        }
        Ok(inserted)
    }

    /// Lift the tombstone on a recreated id, then persist.
    ///
    /// Returns `false` if the id was not tombstoned (nothing persisted).
    pub async fn remove(&self, id: &RecordId) -> Result<bool, StorageError> {
        let removed = self.lock().remove(id);
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Check whether an id is tombstoned.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.lock().contains(id)
    }

    /// All tombstoned ids.
    pub fn all(&self) -> BTreeSet<RecordId> {
        self.lock().all().clone()
    }

    /// Drop every tombstone whose id is not in `remote_ids`, then persist.
    ///
    /// Returns the pruned ids. Nothing is written when nothing was pruned.
    pub async fn prune(&self, remote_ids: &BTreeSet<RecordId>) -> Result<Vec<RecordId>, StorageError> {
        let pruned = self.lock().prune(remote_ids);
        if !pruned.is_empty() {
            tracing::debug!("Pruned {} confirmed tombstones", pruned.len());
            self.persist().await?;
        }
        Ok(pruned)
    }

    /// Number of tombstones.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if there are no tombstones.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    async fn persist(&self) -> Result<(), StorageError> {
        // Snapshot under the persist lock so writes land in order.
        let _guard = self.persist_lock.lock().await;
        let document = {
            let set = self.lock();
            encode_tombstones(set.all())?
        };
        self.store.write(TOMBSTONE_STORAGE_KEY, &document).await
    }

    fn lock(&self) -> MutexGuard<'_, TombstoneSet> {
        self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for TombstoneLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TombstoneLedger")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn ids(values: &[&str]) -> BTreeSet<RecordId> {
        values.iter().map(|v| RecordId::from(*v)).collect()
    }

    fn ledger() -> (MemoryStore, TombstoneLedger) {
        let backend = MemoryStore::new();
        let ledger = TombstoneLedger::new(Arc::new(backend.clone()));
        (backend, ledger)
    }

    #[tokio::test]
    async fn add_survives_reload() {
        let (backend, ledger) = ledger();
        ledger.add(RecordId::from("y")).await.unwrap();

        let reloaded = TombstoneLedger::new(Arc::new(backend));
        reloaded.load().await;

        assert!(reloaded.contains(&RecordId::from("y")));
    }

    #[tokio::test]
    async fn add_is_visible_even_if_persist_fails() {
        let (backend, ledger) = ledger();
        backend.fail_writes(true);

        let result = ledger.add(RecordId::from("y")).await;

        assert!(result.is_err());
        assert!(ledger.contains(&RecordId::from("y")));
    }

    #[tokio::test]
    async fn duplicate_add_does_not_write() {
        let (backend, ledger) = ledger();
        ledger.add(RecordId::from("y")).await.unwrap();
        let writes = backend.write_count();

        assert!(!ledger.add(RecordId::from("y")).await.unwrap());
        assert_eq!(backend.write_count(), writes);
    }

    #[tokio::test]
    async fn remove_survives_reload() {
        let (backend, ledger) = ledger();
        for id in ["a", "b"] {
            ledger.add(RecordId::from(id)).await.unwrap();
        }

        assert!(ledger.remove(&RecordId::from("a")).await.unwrap());
        let writes = backend.write_count();
        assert!(!ledger.remove(&RecordId::from("a")).await.unwrap());
        assert_eq!(backend.write_count(), writes);

        let reloaded = TombstoneLedger::new(Arc::new(backend));
        reloaded.load().await;
        assert_eq!(reloaded.all(), ids(&["b"]));
    }

    #[tokio::test]
    async fn prune_persists_survivors() {
        let (backend, ledger) = ledger();
        for id in ["a", "b"] {
            ledger.add(RecordId::from(id)).await.unwrap();
        }

        let pruned = ledger.prune(&ids(&["b"])).await.unwrap();

        assert_eq!(pruned, vec![RecordId::from("a")]);
        let reloaded = TombstoneLedger::new(Arc::new(backend));
        reloaded.load().await;
        assert_eq!(reloaded.all(), ids(&["b"]));
    }

    #[tokio::test]
    async fn corrupt_state_loads_empty() {
        let (backend, ledger) = ledger();
        backend.set_raw(TOMBSTONE_STORAGE_KEY, "[1, 2");

        assert_eq!(ledger.load().await, 0);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn load_merges_with_tombstones_added_before_it() {
        let (backend, ledger) = ledger();
        backend.fail_writes(true);
        let _ = ledger.add(RecordId::from("new")).await;
        backend.fail_writes(false);
        backend.set_raw(
            TOMBSTONE_STORAGE_KEY,
            r#"{"version": 1, "ids": ["old"]}"#,
        );

        ledger.load().await;

        assert_eq!(ledger.all(), ids(&["new", "old"]));
    }
}
