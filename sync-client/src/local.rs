//! Local store: the canonical in-memory view of records, persisted.
//!
//! Every local write bumps a generation counter. A merge takes a
//! generation mark when it snapshots the unsynced records and hands it back
//! with the merged view; records written after the mark are newer than the
//! merge's inputs and are kept as they are.

use crate::storage::{load_document, StateStore, StorageError};
use hearth_sync_types::persisted::{decode_records, encode_records, RECORDS_STORAGE_KEY};
use hearth_sync_types::{Record, RecordId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct LocalState {
    records: BTreeMap<RecordId, Record>,
    generation: u64,
    last_write: BTreeMap<RecordId, u64>,
}

impl LocalState {
    fn touch(&mut self, id: &RecordId) {
        self.generation += 1;
        self.last_write.insert(id.clone(), self.generation);
    }

    fn written_since(&self, id: &RecordId, mark: u64) -> bool {
        self.last_write.get(id).is_some_and(|g| *g > mark)
    }
}

/// Snapshot of unsynced records taken for a merge.
#[derive(Debug, Clone)]
pub struct UnsyncedSnapshot {
    /// Records with `unsynced = true`.
    pub records: Vec<Record>,
    /// Generation at snapshot time.
    pub mark: u64,
}

/// Canonical local view of records.
pub struct LocalStore {
    state: Mutex<LocalState>,
    store: Arc<dyn StateStore>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl LocalStore {
    /// Create an empty store over a state backend.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            state: Mutex::new(LocalState::default()),
            store,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Restore the persisted view. Records written since startup win.
    pub async fn load(&self) -> usize {
        let records = load_document(self.store.as_ref(), RECORDS_STORAGE_KEY, decode_records).await;
        let mut state = self.lock();
        for record in records {
            state.records.entry(record.id.clone()).or_insert(record);
        }
        tracing::debug!("Loaded {} local records", state.records.len());
        state.records.len()
    }

    /// Get one record.
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.lock().records.get(id).cloned()
    }

    /// All records in id order.
    pub fn list(&self) -> Vec<Record> {
        self.lock().records.values().cloned().collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Records not yet confirmed by the remote store.
    pub fn unsynced(&self) -> Vec<Record> {
        self.snapshot_unsynced().records
    }

    /// Unsynced records plus a generation mark for [`Self::apply_merge`].
    pub fn snapshot_unsynced(&self) -> UnsyncedSnapshot {
        let state = self.lock();
        UnsyncedSnapshot {
            records: state.records.values().filter(|r| r.unsynced).cloned().collect(),
            mark: state.generation,
        }
    }

    /// Write a record from a local mutation, then persist.
    pub async fn upsert_local(&self, record: Record) -> Result<(), StorageError> {
        {
            let mut state = self.lock();
            state.touch(&record.id);
            state.records.insert(record.id.clone(), record);
        }
        self.persist().await
    }

    /// Remove a record from the view, then persist.
    ///
    /// Returns the removed record.
    pub async fn remove(&self, id: &RecordId) -> Result<Option<Record>, StorageError> {
        let removed = {
            let mut state = self.lock();
            state.touch(id);
            state.records.remove(id)
        };
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Replace the view with a merge result, then persist.
    ///
    /// Records written locally after `mark` keep their local state (or
    /// stay removed); everything else comes from `merged`.
    pub async fn apply_merge(&self, merged: Vec<Record>, mark: u64) -> Result<(), StorageError> {
        {
            let mut state = self.lock();
            let mut next: BTreeMap<RecordId, Record> = merged
                .into_iter()
                .filter(|r| !state.written_since(&r.id, mark))
                .map(|r| (r.id.clone(), r))
                .collect();
            for (id, record) in &state.records {
                if state.written_since(id, mark) {
                    next.insert(id.clone(), record.clone());
                }
            }
            state.records = next;
            state.last_write.retain(|_, g| *g > mark);
        }
        self.persist().await
    }

    /// Clear `unsynced` and `sync_error`, store the provider id, persist.
    ///
    /// Returns `false` if the record is gone.
    pub async fn mark_synced(
        &self,
        id: &RecordId,
        external_id: Option<String>,
    ) -> Result<bool, StorageError> {
        let found = self.update(id, |record| {
            record.unsynced = false;
            record.sync_error = None;
            if external_id.is_some() {
                record.external_id = external_id;
            }
        });
        if found {
            self.persist().await?;
        }
        Ok(found)
    }

    /// Clear `sync_error` and store the provider id, keeping `unsynced`.
    ///
    /// Used when the provider accepted the record but the remote store has
    /// not confirmed it yet.
    pub async fn record_delivery(
        &self,
        id: &RecordId,
        external_id: Option<String>,
    ) -> Result<bool, StorageError> {
        let found = self.update(id, |record| {
            record.sync_error = None;
            if external_id.is_some() {
                record.external_id = external_id;
            }
        });
        if found {
            self.persist().await?;
        }
        Ok(found)
    }

    /// Store the provider id without touching the sync flags.
    pub async fn set_external_id(
        &self,
        id: &RecordId,
        external_id: String,
    ) -> Result<bool, StorageError> {
        let found = self.update(id, |record| record.external_id = Some(external_id));
        if found {
            self.persist().await?;
        }
        Ok(found)
    }

    /// Set the record's user-visible sync error, persist.
    pub async fn mark_sync_error(&self, id: &RecordId, error: &str) -> Result<bool, StorageError> {
        let found = self.update(id, |record| record.sync_error = Some(error.to_string()));
        if found {
            self.persist().await?;
        }
        Ok(found)
    }

    fn update(&self, id: &RecordId, apply: impl FnOnce(&mut Record)) -> bool {
        let mut state = self.lock();
        match state.records.get_mut(id) {
            Some(record) => {
                apply(record);
                true
            }
            None => false,
        }
    }

    async fn persist(&self) -> Result<(), StorageError> {
        let _guard = self.persist_lock.lock().await;
        let document = {
            let state = self.lock();
            encode_records(state.records.values())?
        };
        self.store.write(RECORDS_STORAGE_KEY, &document).await
    }

    fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use hearth_sync_types::{OwnerId, RecordKind};
    use serde_json::json;

    fn record(id: &str, title: &str) -> Record {
        let mut record = Record::new(OwnerId::new("u1"), RecordKind::Task, json!({ "title": title }));
        record.id = RecordId::from(id);
        record
    }

    fn local() -> (MemoryStore, LocalStore) {
        let backend = MemoryStore::new();
        let local = LocalStore::new(Arc::new(backend.clone()));
        (backend, local)
    }

    #[tokio::test]
    async fn unsynced_record_survives_reload() {
        let (backend, local) = local();
        local.upsert_local(record("x", "offline")).await.unwrap();

        let reloaded = LocalStore::new(Arc::new(backend));
        reloaded.load().await;

        let x = reloaded.get(&RecordId::from("x")).unwrap();
        assert!(x.unsynced);
        assert_eq!(x.title(), Some("offline"));
    }

    #[tokio::test]
    async fn mark_synced_clears_flags_and_stores_external_id() {
        let (_, local) = local();
        let mut rec = record("x", "t");
        rec.sync_error = Some("old failure".into());
        local.upsert_local(rec).await.unwrap();

        let id = RecordId::from("x");
        assert!(local.mark_synced(&id, Some("ext-1".into())).await.unwrap());

        let x = local.get(&id).unwrap();
        assert!(!x.unsynced);
        assert!(x.sync_error.is_none());
        assert_eq!(x.external_id.as_deref(), Some("ext-1"));
    }

    #[tokio::test]
    async fn record_delivery_keeps_unsynced() {
        let (_, local) = local();
        let mut rec = record("x", "t");
        rec.sync_error = Some("old failure".into());
        local.upsert_local(rec).await.unwrap();

        let id = RecordId::from("x");
        assert!(local.record_delivery(&id, Some("ext-1".into())).await.unwrap());

        let x = local.get(&id).unwrap();
        assert!(x.unsynced);
        assert!(x.sync_error.is_none());
        assert_eq!(x.external_id.as_deref(), Some("ext-1"));
    }

    #[tokio::test]
    async fn mark_on_missing_record_is_a_no_op() {
        let (backend, local) = local();
        let id = RecordId::from("gone");

        assert!(!local.mark_sync_error(&id, "boom").await.unwrap());
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn apply_merge_keeps_writes_made_during_the_merge() {
        let (_, local) = local();
        local.upsert_local(record("a", "before")).await.unwrap();
        let snapshot = local.snapshot_unsynced();

        // Saved while the remote fetch was in flight
        local.upsert_local(record("b", "during")).await.unwrap();

        let mut merged_a = record("a", "remote");
        merged_a.unsynced = false;
        local.apply_merge(vec![merged_a], snapshot.mark).await.unwrap();

        assert_eq!(local.get(&RecordId::from("a")).unwrap().title(), Some("remote"));
        assert_eq!(local.get(&RecordId::from("b")).unwrap().title(), Some("during"));
    }

    #[tokio::test]
    async fn apply_merge_does_not_resurrect_removed_records() {
        let (_, local) = local();
        local.upsert_local(record("a", "a")).await.unwrap();
        let snapshot = local.snapshot_unsynced();
        local.remove(&RecordId::from("a")).await.unwrap();

        local
            .apply_merge(vec![record("a", "a")], snapshot.mark)
            .await
            .unwrap();

        assert!(local.get(&RecordId::from("a")).is_none());
    }

    #[tokio::test]
    async fn corrupt_records_load_empty() {
        let (backend, local) = local();
        backend.set_raw(RECORDS_STORAGE_KEY, r#"{"version": 1, "records": 5}"#);

        assert_eq!(local.load().await, 0);
    }

    #[tokio::test]
    async fn unsynced_lists_only_unconfirmed() {
        let (_, local) = local();
        local.upsert_local(record("a", "a")).await.unwrap();
        let mut synced = record("b", "b");
        synced.unsynced = false;
        local.upsert_local(synced).await.unwrap();

        let unsynced = local.unsynced();

        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, RecordId::from("a"));
    }
}
