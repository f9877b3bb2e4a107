use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Key-value backend for snapshot history.
///
/// Implementations must be thread-safe and treat keys as opaque names. The
/// filesystem and in-memory backends are interchangeable; a cloud object
/// store fits the same contract.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create or replace the entry under `key`.
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Read the entry under `key`.
    ///
    /// Returns `Err(StorageError::NotFound)` if there is no such entry,
    /// distinct from any other failure.
    async fn read(&self, key: &str) -> StorageResult<Bytes>;

    /// All keys starting with `prefix`, sorted newest first (descending).
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Delete the entry under `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Release backend resources.
    async fn close(&self) -> StorageResult<()>;
}
