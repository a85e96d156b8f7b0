//! JSON-file remote store.
//!
//! Stands in for the authoritative remote: every record of every owner in
//! one pretty-printed JSON file. Other tools (or a second data directory)
//! can edit the file to simulate changes made on another device.

use async_trait::async_trait;
use hearth_sync_client::{RemoteError, RemotePage, RemoteStore, SyncStatus};
use hearth_sync_types::{Cursor, OwnerId, Record, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RemoteFile {
    #[serde(default)]
    records: BTreeMap<RecordId, Record>,
}

/// Remote store backed by a JSON file.
#[derive(Debug)]
pub struct FileRemote {
    path: PathBuf,
    offline: bool,
    lock: Mutex<()>,
}

impl FileRemote {
    /// Use the file at `path`. A missing file is an empty remote.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            offline: false,
            lock: Mutex::new(()),
        }
    }

    /// Make every call fail as unreachable.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline {
            return Err(RemoteError::Unavailable("offline mode".into()));
        }
        Ok(())
    }

    async fn read_file(&self) -> Result<RemoteFile, RemoteError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| RemoteError::Malformed(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RemoteFile::default()),
            Err(e) => Err(RemoteError::Unavailable(e.to_string())),
        }
    }

    async fn write_file(&self, file: &RemoteFile) -> Result<(), RemoteError> {
        let content = serde_json::to_string_pretty(file)
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))
    }

    /// Read-modify-write under the lock. Nothing is written if `apply` fails.
    async fn modify<F>(&self, apply: F) -> Result<(), RemoteError>
    where
        F: FnOnce(&mut RemoteFile) -> Result<(), RemoteError> + Send,
    {
        self.check_online()?;
        let _guard = self.lock.lock().await;
        let mut file = self.read_file().await?;
        apply(&mut file)?;
        self.write_file(&file).await
    }
}

#[async_trait]
impl RemoteStore for FileRemote {
    async fn fetch_page(
        &self,
        owner: &OwnerId,
        cursor: Cursor,
        page_size: usize,
    ) -> Result<RemotePage, RemoteError> {
        self.check_online()?;
        let file = {
            let _guard = self.lock.lock().await;
            self.read_file().await?
        };

        let owned: Vec<Record> = file
            .records
            .into_values()
            .filter(|r| &r.owner == owner)
            .collect();
        let start = usize::try_from(cursor.value())
            .unwrap_or(usize::MAX)
            .min(owned.len());
        let end = start.saturating_add(page_size).min(owned.len());

        Ok(RemotePage {
            has_more: end < owned.len(),
            records: owned[start..end].to_vec(),
        })
    }

    async fn upsert(&self, record: &Record) -> Result<(), RemoteError> {
        let mut stored = record.clone();
        stored.unsynced = false;
        self.modify(move |file| {
            file.records.insert(stored.id.clone(), stored);
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &RecordId) -> Result<(), RemoteError> {
        let id = id.clone();
        self.modify(move |file| {
            file.records.remove(&id);
            Ok(())
        })
        .await
    }

    async fn update_sync_status(
        &self,
        id: &RecordId,
        status: &SyncStatus,
    ) -> Result<(), RemoteError> {
        let id = id.clone();
        let status = status.clone();
        self.modify(move |file| {
            let Some(record) = file.records.get_mut(&id) else {
                return Err(RemoteError::Rejected(format!("unknown record {}", id)));
            };
            match status {
                SyncStatus::Synced { external_id } => {
                    record.sync_error = None;
                    if external_id.is_some() {
                        record.external_id = external_id;
                    }
                }
                SyncStatus::Failed { error } => record.sync_error = Some(error),
            }
            Ok(())
        })
        .await
    }
}
