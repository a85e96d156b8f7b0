//! In-memory state store.
//!
//! Clones share the same map, so a "restart" in tests is a new engine built
//! over a clone of the old store.

use super::{StateStore, StorageError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory key/value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    values: HashMap<String, String>,
    fail_writes: bool,
    writes: usize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a raw document (for corrupt-state tests).
    pub fn set_raw(&self, key: &str, value: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.values.insert(key.to_string(), value.to_string());
    }

    /// Get a raw document.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.values.get(key).cloned()
    }

    /// Make every write fail.
    pub fn fail_writes(&self, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_writes = fail;
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.writes
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.values.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(StorageError::Backend("writes disabled".into()));
        }
        inner.values.insert(key.to_string(), value.to_string());
        inner.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();

        store.write("k", "v").await.unwrap();

        assert_eq!(other.read("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(other.read("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_writes_leave_value_untouched() {
        let store = MemoryStore::new();
        store.set_raw("k", "old");
        store.fail_writes(true);

        assert!(store.write("k", "new").await.is_err());
        assert_eq!(store.get_raw("k").as_deref(), Some("old"));
    }
}
