use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StorageError, StorageResult};
use crate::traits::Storage;

/// In-memory, map-based storage.
///
/// Intended for tests and embedding. Entries are held behind a `RwLock` and
/// lost when the store is dropped.
#[derive(Default)]
pub struct InMemoryStorage {
    entries: RwLock<BTreeMap<String, Bytes>>,
    closed: AtomicBool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.ensure_open()?;
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), data);
        Ok(())
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        self.ensure_open()?;
        self.entries
            .read()
            .expect("lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        let entries = self.entries.read().expect("lock poisoned");
        Ok(entries
            .keys()
            .rev()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.ensure_open()?;
        self.entries.write().expect("lock poisoned").remove(key);
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("entries", &self.len())
            .finish()
    }
}
