//! Listener for the socket protocol.
//!
//! One task per connection. Requests on a connection are answered in order;
//! a framing error is answered with a code-4 payload and closes that
//! connection only.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use cs_protocol::{ErrorPayload, WireCodec};
use cs_repo::Repo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::ServerResult;
use crate::handler;

/// Accept connections until shutdown is signalled.
pub async fn serve_socket(
    listener: TcpListener,
    repo: Arc<Repo>,
    mut shutdown: watch::Receiver<bool>,
) -> ServerResult<()> {
    info!(addr = %listener.local_addr()?, "socket listener started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => spawn_connection(repo.clone(), stream, peer, shutdown.clone()),
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
    info!("socket listener stopped");
    Ok(())
}

/// Run a connection in its own task, supervised so a panic is logged and
/// only drops that connection.
fn spawn_connection(repo: Arc<Repo>, stream: TcpStream, peer: SocketAddr, shutdown: watch::Receiver<bool>) {
    debug!(%peer, "connection accepted");
    let connection = tokio::spawn(serve_connection(repo, stream, peer, shutdown));
    tokio::spawn(async move {
        match connection.await {
            Ok(Ok(())) => debug!(%peer, "connection closed"),
            Ok(Err(e)) => debug!(%peer, error = %e, "connection ended with error"),
            Err(e) if e.is_panic() => error!(%peer, "connection handler panicked"),
            Err(_) => {}
        }
    });
}

async fn serve_connection(
    repo: Arc<Repo>,
    mut stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> ServerResult<()> {
    stream.set_nodelay(true)?;
    let mut buf = BytesMut::with_capacity(8 * 1024);
    loop {
        match WireCodec::decode_request(&buf) {
            Ok(Some((request, used))) => {
                buf.advance(used);
                let reply = match handler::dispatch(&repo, &request.route, &request.body).await {
                    Ok(reply) => reply,
                    Err(payload) => WireCodec::error(&payload),
                };
                stream.write_all(&WireCodec::encode_response(&reply)).await?;
            }
            Ok(None) => {
                let read = tokio::select! {
                    biased;
                    _ = shutdown.changed() => return Ok(()),
                    read = stream.read_buf(&mut buf) => read?,
                };
                if read == 0 {
                    return Ok(());
                }
            }
            Err(e) => {
                warn!(%peer, error = %e, "malformed request, closing connection");
                let payload = ErrorPayload::from(&e);
                stream
                    .write_all(&WireCodec::encode_response(&WireCodec::error(&payload)))
                    .await?;
                stream.shutdown().await?;
                return Err(e.into());
            }
        }
    }
}
