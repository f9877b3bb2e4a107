use thiserror::Error;

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No entry under this key.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The key cannot be mapped onto the backend (e.g. contains a path separator).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The backend was closed and accepts no further calls.
    #[error("storage is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Refused to persist an empty snapshot.
    #[error("snapshot is empty")]
    EmptySnapshot,
}

pub type HistoryResult<T> = Result<T, HistoryError>;
