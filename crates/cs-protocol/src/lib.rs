//! Wire protocol for ContentServer.
//!
//! A request is an ASCII header `<route>:<length>` followed by exactly
//! `<length>` bytes of JSON; a response is an ASCII length followed by the
//! JSON body. Successful replies are wrapped as `{"reply": ...}`, failures
//! are `{"status": 500, "code": n, "message": "..."}`.

pub mod client;
pub mod codec;
pub mod error;
pub mod message;

pub use client::SocketClient;
pub use codec::{RawRequest, WireCodec};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{Empty, Envelope, ErrorCode, ErrorPayload, Route, MAX_BODY_LEN, MAX_HEADER_LEN};
