use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Longest accepted request header (`<route>:<length>`).
pub const MAX_HEADER_LEN: usize = 256;
/// Largest accepted request body.
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// Every operation reachable over the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    GetUris,
    GetContent,
    GetNodes,
    Update,
    GetRepo,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Self::GetUris,
        Self::GetContent,
        Self::GetNodes,
        Self::Update,
        Self::GetRepo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetUris => "getURIs",
            Self::GetContent => "getContent",
            Self::GetNodes => "getNodes",
            Self::Update => "update",
            Self::GetRepo => "getRepo",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Route {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|route| route.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownRoute(s.to_string()))
    }
}

/// Numeric error codes carried in [`ErrorPayload::code`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    UnknownRoute = 1,
    MalformedJson = 2,
    Internal = 3,
    MalformedHeader = 4,
}

/// Body of every error reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub status: u16,
    pub code: u32,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: 500,
            code: code as u32,
            message: message.into(),
        }
    }
}

impl From<&ProtocolError> for ErrorPayload {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::Remote { code, message } => Self {
                status: 500,
                code: *code,
                message: message.clone(),
            },
            other => Self::new(other.code(), other.to_string()),
        }
    }
}

/// Successful reply wrapper: `{"reply": payload}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub reply: T,
}

/// A decoded reply body: either an error or the wrapped payload.
///
/// The error arm is tried first: an `Option` payload would otherwise accept
/// an error body as a missing `reply`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Reply<T> {
    Err(ErrorPayload),
    Ok(Envelope<T>),
}

/// Body of `update` and `getRepo`; both take no arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_names() {
        for route in Route::ALL {
            assert_eq!(route.as_str().parse::<Route>().unwrap(), route);
        }
        assert_eq!(Route::GetUris.to_string(), "getURIs");
        assert!(matches!(
            "getUris".parse::<Route>(),
            Err(ProtocolError::UnknownRoute(_))
        ));
    }

    #[test]
    fn error_payload_shape() {
        let payload = ErrorPayload::new(ErrorCode::MalformedHeader, "bad header");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"status": 500, "code": 4, "message": "bad header"}));
    }

    #[test]
    fn payload_from_error() {
        let payload = ErrorPayload::from(&ProtocolError::UnknownRoute("nope".into()));
        assert_eq!(payload.code, 1);
        assert!(payload.message.contains("nope"));
    }
}
