use bytes::Bytes;
use serde::Serialize;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Envelope, ErrorPayload, MAX_BODY_LEN, MAX_HEADER_LEN};

/// A framed request as read off the wire. The route is not validated here
/// so the caller can answer an unknown route without dropping the
/// connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRequest {
    pub route: String,
    pub body: Bytes,
}

/// Codec for the ContentServer wire format.
///
/// Requests are `<route>:<length><body>`, responses `<length><body>`, and
/// every body is a JSON object, so the first `{` ends the header.
pub struct WireCodec;

impl WireCodec {
    pub fn encode_request(route: &str, body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(route.len() + 12 + body.len());
        buf.extend_from_slice(route.as_bytes());
        buf.push(b':');
        buf.extend_from_slice(body.len().to_string().as_bytes());
        buf.extend_from_slice(body);
        buf
    }

    /// Decode one request from the front of `data`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, otherwise the request
    /// and the number of bytes consumed.
    pub fn decode_request(data: &[u8]) -> ProtocolResult<Option<(RawRequest, usize)>> {
        let Some(body_start) = find_body_start(data)? else {
            check_partial_request_header(data)?;
            return Ok(None);
        };
        let header = &data[..body_start];
        let Some(colon) = header.iter().position(|b| *b == b':') else {
            return Err(ProtocolError::MalformedHeader("missing ':'".into()));
        };
        let route = parse_route(&header[..colon])?;
        let len = parse_len(&header[colon + 1..])?;
        let total = body_start + len;
        if data.len() < total {
            return Ok(None);
        }
        let body = Bytes::copy_from_slice(&data[body_start..total]);
        Ok(Some((RawRequest { route, body }, total)))
    }

    pub fn encode_response(body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12 + body.len());
        buf.extend_from_slice(body.len().to_string().as_bytes());
        buf.extend_from_slice(body);
        buf
    }

    /// Decode one response body from the front of `data`.
    pub fn decode_response(data: &[u8]) -> ProtocolResult<Option<(Bytes, usize)>> {
        let Some(body_start) = find_body_start(data)? else {
            if !data.iter().all(u8::is_ascii_digit) {
                return Err(ProtocolError::MalformedHeader("non-numeric length".into()));
            }
            return Ok(None);
        };
        // Replies are not capped: `getRepo` returns whatever upstream sent.
        let len = parse_digits(&data[..body_start])?;
        let total = body_start + len;
        if data.len() < total {
            return Ok(None);
        }
        Ok(Some((Bytes::copy_from_slice(&data[body_start..total]), total)))
    }

    /// `{"reply": payload}` as JSON.
    pub fn reply<T: Serialize>(payload: &T) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(&Envelope { reply: payload })?)
    }

    /// Wrap an already serialized JSON document without re-encoding it.
    /// An empty document becomes `null`.
    pub fn raw_reply(json: &[u8]) -> Vec<u8> {
        let json: &[u8] = if json.is_empty() { b"null" } else { json };
        let mut buf = Vec::with_capacity(json.len() + 10);
        buf.extend_from_slice(b"{\"reply\":");
        buf.extend_from_slice(json);
        buf.push(b'}');
        buf
    }

    pub fn error(payload: &ErrorPayload) -> Vec<u8> {
        // A struct of plain strings and integers always serializes.
        serde_json::to_vec(payload).unwrap_or_default()
    }
}

/// Position of the first `{` inside the header window.
fn find_body_start(data: &[u8]) -> ProtocolResult<Option<usize>> {
    let window = &data[..data.len().min(MAX_HEADER_LEN + 1)];
    match window.iter().position(|b| *b == b'{') {
        Some(pos) if pos > MAX_HEADER_LEN => Err(ProtocolError::HeaderTooLong {
            max: MAX_HEADER_LEN,
        }),
        Some(pos) => Ok(Some(pos)),
        None if data.len() > MAX_HEADER_LEN => Err(ProtocolError::HeaderTooLong {
            max: MAX_HEADER_LEN,
        }),
        None => Ok(None),
    }
}

/// Reject a header prefix that can never become valid.
fn check_partial_request_header(data: &[u8]) -> ProtocolResult<()> {
    match data.iter().position(|b| *b == b':') {
        Some(colon) => {
            check_route_chars(&data[..colon])?;
            if !data[colon + 1..].iter().all(u8::is_ascii_digit) {
                return Err(ProtocolError::MalformedHeader("non-numeric length".into()));
            }
        }
        None => check_route_chars(data)?,
    }
    Ok(())
}

fn check_route_chars(route: &[u8]) -> ProtocolResult<()> {
    if route.iter().all(u8::is_ascii_alphanumeric) {
        Ok(())
    } else {
        Err(ProtocolError::MalformedHeader("invalid route characters".into()))
    }
}

fn parse_route(route: &[u8]) -> ProtocolResult<String> {
    if route.is_empty() {
        return Err(ProtocolError::MalformedHeader("empty route".into()));
    }
    check_route_chars(route)?;
    // ASCII alphanumerics are valid UTF-8.
    Ok(String::from_utf8_lossy(route).into_owned())
}

fn parse_digits(digits: &[u8]) -> ProtocolResult<usize> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::MalformedHeader("non-numeric length".into()));
    }
    let len = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| ProtocolError::MalformedHeader("length out of range".into()))?;
    if len == 0 {
        return Err(ProtocolError::MalformedHeader("zero length".into()));
    }
    Ok(len)
}

/// Request body length, bounded by [`MAX_BODY_LEN`].
fn parse_len(digits: &[u8]) -> ProtocolResult<usize> {
    let len = parse_digits(digits)?;
    if len > MAX_BODY_LEN {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_BODY_LEN,
        });
    }
    Ok(len)
}
