use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::traits::Storage;

/// Filesystem storage: every key is a file inside one directory.
///
/// Writes go to a hidden temporary file first and are renamed into place, so
/// readers never observe a partially written entry.
#[derive(Clone, Debug)]
pub struct FsStorage {
    dir: PathBuf,
}

impl FsStorage {
    /// Open storage rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "opened history storage");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || key.starts_with('.')
            || key.contains('/')
            || key.contains('\\')
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let tmp = self.dir.join(format!(".{key}.tmp"));
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(prefix) && !name.starts_with('.') {
                keys.push(name);
            }
        }
        keys.sort_unstable_by(|a, b| b.cmp(a));
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorage::open(dir.path()).await.unwrap();

        store
            .write("repo-current.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        let data = store.read("repo-current.json").await.unwrap();
        assert_eq!(&data[..], b"{}");
        assert!(dir.path().join("repo-current.json").exists());
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorage::open(dir.path()).await.unwrap();
        let err = store.read("missing.json").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorage::open(dir.path()).await.unwrap();
        store.write("a", Bytes::from_static(b"1")).await.unwrap();
        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.read("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_filters_prefix_and_sorts_descending() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorage::open(dir.path().join("nested")).await.unwrap();
        for key in ["p-1", "p-3", "q-9", "p-2"] {
            store.write(key, Bytes::new()).await.unwrap();
        }
        assert_eq!(store.list("p-").await.unwrap(), vec!["p-3", "p-2", "p-1"]);
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStorage::open(dir.path()).await.unwrap();
        for key in ["", "../escape", "a/b", ".hidden"] {
            assert!(matches!(
                store.write(key, Bytes::new()).await,
                Err(StorageError::InvalidKey(_))
            ));
        }
    }
}
