//! SQLite state store.

use crate::error::SqliteStoreError;
use async_trait::async_trait;
use hearth_sync_client::{StateStore, StorageError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// SQLite-backed key/value state store.
///
/// Uses WAL mode for concurrent reads/writes. Each key holds one JSON
/// document that is replaced wholesale on every write.
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (or create) the database at `path`.
    pub async fn new(path: &Path) -> Result<Self, SqliteStoreError> {
        let url = path.to_str().ok_or_else(|| SqliteStoreError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        tracing::debug!("Opened state store at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub async fn in_memory() -> Result<Self, SqliteStoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // One connection: every connection to :memory: is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), SqliteStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn current_timestamp() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for SqliteStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStateStore")
            .field("connections", &self.pool.size())
            .finish()
    }
}

fn backend(err: sqlx::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Self::current_timestamp())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_sync_client::{DurableQueueStore, LocalStore, TombstoneLedger};
    use hearth_sync_types::persisted::QUEUE_STORAGE_KEY;
    use hearth_sync_types::{
        OwnerId, Record, RecordId, RecordKind, ResourceKind, SyncJob, SyncOperation, SyncOptions,
    };
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn task(id: &str, title: &str) -> Record {
        let mut record = Record::new(OwnerId::new("u1"), RecordKind::Task, json!({ "title": title }));
        record.id = RecordId::from(id);
        record
    }

    #[tokio::test]
    async fn read_missing_key_returns_none() {
        let store = SqliteStateStore::in_memory().await.unwrap();

        assert_eq!(store.read("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_replaces_previous_value() {
        let store = SqliteStateStore::in_memory().await.unwrap();

        store.write("k", "one").await.unwrap();
        store.write("k", "two").await.unwrap();

        assert_eq!(store.read("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.db");

        {
            let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(&path).await.unwrap());
            let ledger = TombstoneLedger::new(store.clone());
            ledger.add(RecordId::from("gone")).await.unwrap();

            let local = LocalStore::new(store.clone());
            local.upsert_local(task("x", "offline")).await.unwrap();

            let queue = DurableQueueStore::new(store);
            let job = SyncJob::new(
                task("x", "offline"),
                SyncOperation::Upsert,
                SyncOptions::default_for(ResourceKind::Task),
            );
            queue.save([&job]).await.unwrap();
        }

        let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(&path).await.unwrap());

        let ledger = TombstoneLedger::new(store.clone());
        ledger.load().await;
        assert!(ledger.contains(&RecordId::from("gone")));

        let local = LocalStore::new(store.clone());
        local.load().await;
        assert!(local.get(&RecordId::from("x")).unwrap().unsynced);

        let jobs = DurableQueueStore::new(store).load().await;
        assert!(jobs.contains_key(&RecordId::from("x")));
    }

    #[tokio::test]
    async fn corrupt_document_loads_as_empty_queue() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        store.write(QUEUE_STORAGE_KEY, "not json").await.unwrap();

        let jobs = DurableQueueStore::new(Arc::new(store)).load().await;

        assert!(jobs.is_empty());
    }
}
