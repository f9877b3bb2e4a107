use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{HistoryError, HistoryResult};
use crate::traits::Storage;

const SUFFIX: &str = ".json";
const CURRENT: &str = "current";

/// Naming and retention settings for a [`History`].
#[derive(Clone, Debug)]
pub struct HistoryConfig {
    /// Key prefix shared by all entries.
    pub prefix: String,
    /// Number of timestamped snapshots kept after each add.
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            prefix: "contentserver-repo".into(),
            limit: 2,
        }
    }
}

/// Append-only snapshot history with a "current" pointer.
pub struct History {
    storage: Arc<dyn Storage>,
    config: HistoryConfig,
    /// Guards the current entry. Holds the timestamp of the last append so
    /// keys stay strictly increasing.
    current: Mutex<Option<DateTime<Utc>>>,
}

impl History {
    pub fn new(storage: Arc<dyn Storage>, config: HistoryConfig) -> Self {
        Self {
            storage,
            config,
            current: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Key of the "current" entry.
    pub fn current_key(&self) -> String {
        format!("{}-{CURRENT}{SUFFIX}", self.config.prefix)
    }

    fn snapshot_key(&self, at: DateTime<Utc>) -> String {
        format!(
            "{}-{}{SUFFIX}",
            self.config.prefix,
            at.to_rfc3339_opts(SecondsFormat::Nanos, true)
        )
    }

    /// Persist a successfully loaded snapshot.
    ///
    /// Writes a timestamped entry, replaces the current entry, then applies
    /// retention. Returns the timestamped key.
    pub async fn add(&self, data: Bytes) -> HistoryResult<String> {
        if data.is_empty() {
            return Err(HistoryError::EmptySnapshot);
        }

        let key = {
            let mut last = self.current.lock().await;
            let mut now = Utc::now();
            if let Some(previous) = *last {
                if now <= previous {
                    now = previous + Duration::nanoseconds(1);
                }
            }
            let key = self.snapshot_key(now);
            self.storage.write(&key, data.clone()).await?;
            self.storage.write(&self.current_key(), data).await?;
            *last = Some(now);
            key
        };
        debug!(%key, "snapshot added to history");

        let removed = self.cleanup().await?;
        if removed > 0 {
            debug!(removed, "history trimmed");
        }
        Ok(key)
    }

    /// The last successfully loaded snapshot, if any.
    pub async fn current(&self) -> HistoryResult<Option<Bytes>> {
        let _guard = self.current.lock().await;
        match self.storage.read(&self.current_key()).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Timestamped snapshot keys, newest first. Never includes "current".
    pub async fn snapshots(&self) -> HistoryResult<Vec<String>> {
        let current = self.current_key();
        let prefix = format!("{}-", self.config.prefix);
        let keys = self.storage.list(&prefix).await?;
        Ok(keys
            .into_iter()
            .filter(|key| *key != current && key.ends_with(SUFFIX))
            .collect())
    }

    /// Delete all but the newest `limit` timestamped snapshots.
    pub async fn cleanup(&self) -> HistoryResult<usize> {
        let snapshots = self.snapshots().await?;
        let mut removed = 0;
        for key in snapshots.iter().skip(self.config.limit) {
            self.storage.delete(key).await?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Close the underlying storage.
    pub async fn close(&self) {
        if let Err(e) = self.storage.close().await {
            warn!(error = %e, "failed to close history storage");
        } else {
            info!("history storage closed");
        }
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("prefix", &self.config.prefix)
            .field("limit", &self.config.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FsStorage;
    use crate::memory::InMemoryStorage;

    fn history(limit: usize) -> (Arc<InMemoryStorage>, History) {
        let storage = Arc::new(InMemoryStorage::new());
        let config = HistoryConfig {
            prefix: "test".into(),
            limit,
        };
        (storage.clone(), History::new(storage, config))
    }

    #[tokio::test]
    async fn empty_history_has_no_current() {
        let (_, history) = history(2);
        assert!(history.current().await.unwrap().is_none());
        assert!(history.snapshots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_updates_current() {
        let (_, history) = history(2);
        history.add(Bytes::from_static(b"{\"v\":1}")).await.unwrap();
        history.add(Bytes::from_static(b"{\"v\":2}")).await.unwrap();
        let current = history.current().await.unwrap().unwrap();
        assert_eq!(&current[..], b"{\"v\":2}");
    }

    #[tokio::test]
    async fn retention_keeps_newest() {
        let (storage, history) = history(2);
        let mut keys = Vec::new();
        for i in 0..5 {
            keys.push(history.add(Bytes::from(format!("{{\"v\":{i}}}"))).await.unwrap());
        }
        let kept = history.snapshots().await.unwrap();
        assert_eq!(kept, vec![keys[4].clone(), keys[3].clone()]);
        // Two snapshots plus current.
        assert_eq!(storage.len(), 3);
        assert!(history.current().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn keys_are_strictly_increasing() {
        let (_, history) = history(10);
        let a = history.add(Bytes::from_static(b"a")).await.unwrap();
        let b = history.add(Bytes::from_static(b"b")).await.unwrap();
        assert!(b > a);
        assert!(a.starts_with("test-") && a.ends_with(".json"));
    }

    #[tokio::test]
    async fn zero_limit_keeps_only_current() {
        let (storage, history) = history(0);
        history.add(Bytes::from_static(b"x")).await.unwrap();
        assert!(history.snapshots().await.unwrap().is_empty());
        assert_eq!(storage.len(), 1);
        assert_eq!(&history.current().await.unwrap().unwrap()[..], b"x");
    }

    #[tokio::test]
    async fn empty_snapshot_rejected() {
        let (_, history) = history(2);
        assert!(matches!(
            history.add(Bytes::new()).await,
            Err(HistoryError::EmptySnapshot)
        ));
    }

    #[tokio::test]
    async fn filesystem_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = Arc::new(FsStorage::open(dir.path()).await.unwrap());
            let history = History::new(storage, HistoryConfig::default());
            history.add(Bytes::from_static(b"{\"de\":{}}")).await.unwrap();
        }
        let storage = Arc::new(FsStorage::open(dir.path()).await.unwrap());
        let history = History::new(storage, HistoryConfig::default());
        let current = history.current().await.unwrap().unwrap();
        assert_eq!(&current[..], b"{\"de\":{}}");
        assert_eq!(history.snapshots().await.unwrap().len(), 1);
        assert!(dir.path().join("contentserver-repo-current.json").exists());
    }
}
