use cs_history::HistoryError;
use cs_model::{MergeError, ModelError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    /// Malformed caller request; no state was touched.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("content not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    Forbidden(String),

    /// Another update is in flight.
    #[error("update already in progress")]
    UpdateRejected,

    #[error("malformed snapshot: {0}")]
    Parse(String),

    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    /// Fetching the snapshot from upstream failed.
    #[error("fetch failed: {0}")]
    Transport(String),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("repository is shutting down")]
    ShuttingDown,
}

impl From<ModelError> for RepoError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Parse(e) => Self::Parse(e.to_string()),
            ModelError::Merge(e) => Self::Merge(e),
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
