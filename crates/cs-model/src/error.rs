use thiserror::Error;

/// Structural violations detected while building a dimension.
///
/// Any of these aborts the whole update; nothing is published.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("duplicate node id {id:?} in dimension {dimension:?}")]
    DuplicateNodeId { dimension: String, id: String },

    #[error("duplicate uri {uri:?} in dimension {dimension:?} (node {id:?})")]
    DuplicateUri {
        dimension: String,
        uri: String,
        id: String,
    },

    #[error("link id {link_id:?} of node {id:?} points nowhere in dimension {dimension:?}")]
    DanglingLink {
        dimension: String,
        id: String,
        link_id: String,
    },
}

/// Errors from decoding or building content.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The snapshot bytes are not valid snapshot JSON.
    #[error("malformed snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Merge(#[from] MergeError),
}

pub type ModelResult<T> = Result<T, ModelError>;
