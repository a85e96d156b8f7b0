//! Durable queue store.
//!
//! Persists the outbound queue as one versioned document so pending work
//! survives restarts. Loading never fails: a missing or corrupt document is
//! an empty queue.

use crate::storage::{load_document, StateStore, StorageError};
use hearth_sync_types::persisted::{decode_queue, encode_queue, QUEUE_STORAGE_KEY};
use hearth_sync_types::{RecordId, SyncJob};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Persistence for outbound sync jobs.
#[derive(Clone)]
pub struct DurableQueueStore {
    store: Arc<dyn StateStore>,
}

impl DurableQueueStore {
    /// Create a queue store over a state backend.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Replace the persisted queue with `jobs`.
    pub async fn save<'a>(
        &self,
        jobs: impl IntoIterator<Item = &'a SyncJob>,
    ) -> Result<(), StorageError> {
        let document = encode_queue(jobs)?;
        self.store.write(QUEUE_STORAGE_KEY, &document).await
    }

    /// Load the persisted queue keyed by record id.
    ///
    /// If the document lists an id twice the later entry wins.
    pub async fn load(&self) -> BTreeMap<RecordId, SyncJob> {
        load_document(self.store.as_ref(), QUEUE_STORAGE_KEY, decode_queue)
            .await
            .into_iter()
            .map(|job| (job.id.clone(), job))
            .collect()
    }
}

impl std::fmt::Debug for DurableQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableQueueStore")
            .field("key", &QUEUE_STORAGE_KEY)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use hearth_sync_types::{
        OwnerId, Record, RecordKind, ResourceKind, SyncOperation, SyncOptions,
    };
    use serde_json::json;

    fn job(title: &str) -> SyncJob {
        let record = Record::new(OwnerId::new("u1"), RecordKind::Event, json!({ "title": title }));
        SyncJob::new(
            record,
            SyncOperation::Upsert,
            SyncOptions::default_for(ResourceKind::Event),
        )
    }

    fn queue_store() -> (MemoryStore, DurableQueueStore) {
        let backend = MemoryStore::new();
        let store = DurableQueueStore::new(Arc::new(backend.clone()));
        (backend, store)
    }

    #[tokio::test]
    async fn save_then_load_restores_jobs() {
        let (_, store) = queue_store();
        let mut first = job("standup");
        first.retry_count = 2;
        let second = job("review");

        store.save([&first, &second]).await.unwrap();
        let loaded = store.load().await;

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[&first.id], first);
        assert_eq!(loaded[&second.id].payload.title(), Some("review"));
    }

    #[tokio::test]
    async fn missing_document_is_empty() {
        let (_, store) = queue_store();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_document_is_empty() {
        let (backend, store) = queue_store();
        backend.set_raw(QUEUE_STORAGE_KEY, "{not json");

        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_version_is_empty() {
        let (backend, store) = queue_store();
        backend.set_raw(QUEUE_STORAGE_KEY, r#"{"version": 9, "jobs": []}"#);

        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_jobs_are_skipped() {
        let (backend, store) = queue_store();
        let good = job("good");
        store.save([&good]).await.unwrap();
        let mut document: serde_json::Value =
            serde_json::from_str(&backend.get_raw(QUEUE_STORAGE_KEY).unwrap()).unwrap();
        document["jobs"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "id": "broken" }));
        backend.set_raw(QUEUE_STORAGE_KEY, &document.to_string());

        let loaded = store.load().await;

        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key(&good.id));
    }

    #[tokio::test]
    async fn save_surfaces_backend_failure() {
        let (backend, store) = queue_store();
        backend.fail_writes(true);

        assert!(store.save([&job("x")]).await.is_err());
    }
}
