use thiserror::Error;

use crate::message::ErrorCode;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown route: {0}")]
    UnknownRoute(String),

    #[error("header too long (max {max} bytes)")]
    HeaderTooLong { max: usize },

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("remote error: code={code}, message={message}")]
    Remote { code: u32, message: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Wire error code reported to the peer for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownRoute(_) => ErrorCode::UnknownRoute,
            Self::Json(_) => ErrorCode::MalformedJson,
            Self::HeaderTooLong { .. } | Self::MalformedHeader(_) | Self::MessageTooLarge { .. } => {
                ErrorCode::MalformedHeader
            }
            _ => ErrorCode::Internal,
        }
    }

    /// Framing errors leave the stream in an unknown state; the connection
    /// must be closed.
    pub fn is_fatal(&self) -> bool {
        self.code() == ErrorCode::MalformedHeader
            || matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
