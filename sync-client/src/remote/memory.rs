//! In-memory remote store for testing.
//!
//! Holds records in id order, pages them by offset, and can be taken
//! offline or told to fail a single call.

use super::{RemoteError, RemotePage, RemoteStore, SyncStatus};
use async_trait::async_trait;
use hearth_sync_types::{Cursor, OwnerId, Record, RecordId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// In-memory remote store.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<MemoryRemoteInner>>,
}

#[derive(Debug, Default)]
struct MemoryRemoteInner {
    records: BTreeMap<RecordId, Record>,
    offline: bool,
    fail_fetch_at_page: Option<usize>,
    fetch_calls: usize,
    upserts: usize,
    deletes: usize,
    statuses: Vec<(RecordId, SyncStatus)>,
}

impl MemoryRemote {
    /// Create an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a record directly (as if another device wrote it).
    pub fn insert(&self, record: Record) {
        let mut inner = self.inner.lock().unwrap();
        inner.records.insert(record.id.clone(), record);
    }

    /// Remove a record directly.
    pub fn remove(&self, id: &RecordId) {
        let mut inner = self.inner.lock().unwrap();
        inner.records.remove(id);
    }

    /// Get a record.
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        let inner = self.inner.lock().unwrap();
        inner.records.get(id).cloned()
    }

    /// All records in id order.
    pub fn records(&self) -> Vec<Record> {
        let inner = self.inner.lock().unwrap();
        inner.records.values().cloned().collect()
    }

    /// Make every call fail with [`RemoteError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.offline = offline;
    }

    /// Cause the next fetch of page `page` (0-based) to fail.
    pub fn fail_fetch_at_page(&self, page: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_fetch_at_page = Some(page);
    }

    /// Number of `fetch_page` calls.
    pub fn fetch_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.fetch_calls
    }

    /// Number of successful upserts.
    pub fn upsert_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.upserts
    }

    /// Number of successful deletes.
    pub fn delete_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.deletes
    }

    /// Sync statuses written, in order.
    pub fn statuses(&self) -> Vec<(RecordId, SyncStatus)> {
        let inner = self.inner.lock().unwrap();
        inner.statuses.clone()
    }
}

impl Clone for MemoryRemote {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn offline_error() -> RemoteError {
    RemoteError::Unavailable("remote offline".into())
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_page(
        &self,
        owner: &OwnerId,
        cursor: Cursor,
        page_size: usize,
    ) -> Result<RemotePage, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        let page_index = if page_size == 0 {
            0
        } else {
            cursor.value() as usize / page_size
        };
        inner.fetch_calls += 1;

        if inner.offline {
            return Err(offline_error());
        }
        if inner.fail_fetch_at_page == Some(page_index) {
            inner.fail_fetch_at_page = None;
            return Err(RemoteError::Unavailable(format!(
                "fetch failed at page {page_index}"
            )));
        }

        let owned: Vec<&Record> = inner
            .records
            .values()
            .filter(|r| &r.owner == owner)
            .collect();
        let start = (cursor.value() as usize).min(owned.len());
        let end = start.saturating_add(page_size).min(owned.len());

        Ok(RemotePage {
            records: owned[start..end].iter().map(|r| (*r).clone()).collect(),
            has_more: end < owned.len(),
        })
    }

    async fn upsert(&self, record: &Record) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(offline_error());
        }
        let mut stored = record.clone();
        stored.unsynced = false;
        inner.records.insert(stored.id.clone(), stored);
        inner.upserts += 1;
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(offline_error());
        }
        inner.records.remove(id);
        inner.deletes += 1;
        Ok(())
    }

    async fn update_sync_status(
        &self,
        id: &RecordId,
        status: &SyncStatus,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(offline_error());
        }
        let Some(record) = inner.records.get_mut(id) else {
            return Err(RemoteError::Rejected(format!("unknown record {id}")));
        };
        match status {
            SyncStatus::Synced { external_id } => {
                record.sync_error = None;
                if external_id.is_some() {
                    record.external_id = external_id.clone();
                }
            }
            SyncStatus::Failed { error } => {
                record.sync_error = Some(error.clone());
            }
        }
        inner.statuses.push((id.clone(), status.clone()));
        Ok(())
    }
}
