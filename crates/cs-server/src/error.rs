use cs_protocol::{ErrorCode, ErrorPayload};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Repo(#[from] cs_repo::RepoError),

    #[error(transparent)]
    Protocol(#[from] cs_protocol::ProtocolError),

    #[error("history error: {0}")]
    History(#[from] cs_history::HistoryError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<&ServerError> for ErrorPayload {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::Protocol(e) => ErrorPayload::from(e),
            other => ErrorPayload::new(ErrorCode::Internal, other.to_string()),
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
