//! Socket client for the ContentServer wire protocol.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use cs_model::{ContentRequest, Env, Node, NodeRequest, NodesRequest, SiteContent, Snapshot, UpdateResponse, UrisRequest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::debug;

use crate::codec::WireCodec;
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Empty, Reply, Route};

const DEFAULT_POOL_SIZE: usize = 4;

/// Talks to a server over persistent TCP connections.
///
/// Each call takes an idle connection from a small pool (or opens a new
/// one), performs one request/response round-trip and hands the connection
/// back. A connection that saw an I/O or framing error is discarded.
pub struct SocketClient {
    addr: String,
    pool: Mutex<Vec<TcpStream>>,
    pool_size: usize,
}

impl SocketClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_pool_size(addr, DEFAULT_POOL_SIZE)
    }

    pub fn with_pool_size(addr: impl Into<String>, pool_size: usize) -> Self {
        Self {
            addr: addr.into(),
            pool: Mutex::new(Vec::new()),
            pool_size,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn update(&self) -> ProtocolResult<UpdateResponse> {
        self.call(Route::Update, &Empty::default()).await
    }

    pub async fn get_content(&self, request: &ContentRequest) -> ProtocolResult<SiteContent> {
        self.call(Route::GetContent, request).await
    }

    pub async fn get_uris(&self, dimension: &str, ids: &[String]) -> ProtocolResult<HashMap<String, String>> {
        let request = UrisRequest {
            dimension: dimension.to_string(),
            ids: ids.to_vec(),
        };
        self.call(Route::GetUris, &request).await
    }

    pub async fn get_nodes(
        &self,
        env: Env,
        nodes: HashMap<String, NodeRequest>,
    ) -> ProtocolResult<HashMap<String, Node>> {
        let request = NodesRequest {
            env: Some(env),
            nodes,
        };
        self.call(Route::GetNodes, &request).await
    }

    /// The whole published repository; empty if the server has not loaded
    /// anything yet.
    pub async fn get_repo(&self) -> ProtocolResult<Snapshot> {
        let repo: Option<Snapshot> = self.call(Route::GetRepo, &Empty::default()).await?;
        Ok(repo.unwrap_or_default())
    }

    /// One typed round-trip.
    pub async fn call<Req, Resp>(&self, route: Route, request: &Req) -> ProtocolResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)?;
        let reply = self.round_trip(route.as_str(), &body).await?;
        match cs_model::from_json_slice::<Reply<Resp>>(&reply) {
            Ok(Reply::Ok(envelope)) => Ok(envelope.reply),
            Ok(Reply::Err(error)) => Err(ProtocolError::Remote {
                code: error.code,
                message: error.message,
            }),
            Err(e) => Err(ProtocolError::MalformedResponse(e.to_string())),
        }
    }

    /// Send raw request bytes on `route` and return the raw response body.
    pub async fn round_trip(&self, route: &str, body: &[u8]) -> ProtocolResult<Bytes> {
        let mut stream = self.checkout().await?;
        let response = exchange(&mut stream, &WireCodec::encode_request(route, body)).await?;
        self.checkin(stream).await;
        Ok(response)
    }

    async fn checkout(&self) -> ProtocolResult<TcpStream> {
        if let Some(stream) = self.pool.lock().await.pop() {
            return Ok(stream);
        }
        debug!(addr = %self.addr, "opening connection");
        connect(self.addr.as_str()).await
    }

    async fn checkin(&self, stream: TcpStream) {
        let mut pool = self.pool.lock().await;
        if pool.len() < self.pool_size {
            pool.push(stream);
        }
    }
}

async fn connect(addr: impl ToSocketAddrs) -> ProtocolResult<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn exchange(stream: &mut TcpStream, request: &[u8]) -> ProtocolResult<Bytes> {
    stream.write_all(request).await?;
    let mut buf = BytesMut::with_capacity(8 * 1024);
    loop {
        if let Some((body, _)) = WireCodec::decode_response(&buf)? {
            return Ok(body);
        }
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ErrorCode, ErrorPayload};
    use tokio::net::TcpListener;

    /// Answers every request with the same body.
    async fn fixed_server(reply: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let reply = reply.clone();
                tokio::spawn(async move {
                    let mut buf = BytesMut::new();
                    loop {
                        match WireCodec::decode_request(&buf).unwrap() {
                            Some((_, used)) => {
                                let _ = buf.split_to(used);
                                socket
                                    .write_all(&WireCodec::encode_response(&reply))
                                    .await
                                    .unwrap();
                            }
                            None => {
                                if socket.read_buf(&mut buf).await.unwrap() == 0 {
                                    return;
                                }
                            }
                        }
                    }
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn decodes_reply_envelope() {
        let addr = fixed_server(br#"{"reply":{"a":"/a"}}"#.to_vec()).await;
        let client = SocketClient::new(addr);
        let uris = client.get_uris("de", &["a".to_string()]).await.unwrap();
        assert_eq!(uris["a"], "/a");

        // Second call reuses the pooled connection.
        assert_eq!(client.pool.lock().await.len(), 1);
        client.get_uris("de", &["a".to_string()]).await.unwrap();
        assert_eq!(client.pool.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn surfaces_remote_errors() {
        let payload = ErrorPayload::new(ErrorCode::Internal, "invalid request");
        let addr = fixed_server(WireCodec::error(&payload)).await;
        let client = SocketClient::new(addr);
        match client.update().await {
            Err(ProtocolError::Remote { code, message }) => {
                assert_eq!(code, 3);
                assert_eq!(message, "invalid request");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_repo_before_first_load() {
        let addr = fixed_server(WireCodec::raw_reply(b"")).await;
        let client = SocketClient::new(addr);
        assert!(client.get_repo().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn optional_reply_still_surfaces_errors() {
        let payload = ErrorPayload::new(ErrorCode::Internal, "history unavailable");
        let addr = fixed_server(WireCodec::error(&payload)).await;
        let client = SocketClient::new(addr);
        assert!(matches!(
            client.get_repo().await,
            Err(ProtocolError::Remote { code: 3, .. })
        ));
    }

    #[tokio::test]
    async fn deep_reply_decodes() {
        let depth = 150;
        let mut tree = cs_model::SnapshotNode::new(format!("n{depth}"), format!("/n{depth}"));
        for level in (0..depth).rev() {
            tree = cs_model::SnapshotNode::new(format!("n{level}"), format!("/n{level}")).with_child(tree);
        }
        let mut snapshot = Snapshot::new();
        snapshot.insert("de".into(), tree);
        let addr = fixed_server(WireCodec::reply(&snapshot).unwrap()).await;
        let client = SocketClient::new(addr);
        assert_eq!(client.get_repo().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let client = SocketClient::new(addr);
        assert!(matches!(client.get_repo().await, Err(ProtocolError::Io(_))));
    }
}
