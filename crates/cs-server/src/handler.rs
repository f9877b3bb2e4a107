//! Route dispatch shared by the socket and HTTP transports.

use cs_model::{ContentRequest, NodesRequest, UrisRequest};
use cs_protocol::{Empty, ErrorPayload, ProtocolError, Route, WireCodec};
use cs_repo::Repo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ServerResult;

/// Answer one request.
///
/// `Ok` carries a complete `{"reply": ...}` document, `Err` the error
/// payload to send instead. Neither outcome affects the connection.
pub async fn dispatch(repo: &Repo, route: &str, body: &[u8]) -> Result<Vec<u8>, ErrorPayload> {
    match handle(repo, route, body).await {
        Ok(reply) => {
            debug!(route, bytes = reply.len(), "request served");
            Ok(reply)
        }
        Err(e) => {
            warn!(route, error = %e, "request failed");
            Err(ErrorPayload::from(&e))
        }
    }
}

async fn handle(repo: &Repo, route: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
    let route: Route = route.parse()?;
    let reply = match route {
        Route::GetUris => {
            let request: UrisRequest = parse(body)?;
            WireCodec::reply(&repo.get_uris(&request.dimension, &request.ids)?)?
        }
        Route::GetContent => {
            let request: ContentRequest = parse(body)?;
            WireCodec::reply(&repo.get_content(&request)?)?
        }
        Route::GetNodes => {
            let request: NodesRequest = parse(body)?;
            WireCodec::reply(&repo.get_nodes(request.env.as_ref(), &request.nodes)?)?
        }
        Route::Update => {
            parse::<Empty>(body)?;
            WireCodec::reply(&repo.update().await)?
        }
        Route::GetRepo => {
            parse::<Empty>(body)?;
            WireCodec::raw_reply(&repo.get_repo())
        }
    };
    Ok(reply)
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(body)?)
}

/// Body of `GET /health`.
#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub loaded: bool,
    pub updating: bool,
    pub phase: String,
    pub dimensions: Vec<String>,
    pub missed_node_lookups: u64,
}

impl HealthResponse {
    pub fn of(repo: &Repo) -> Self {
        Self {
            status: if repo.is_loaded() { "ok" } else { "loading" },
            loaded: repo.is_loaded(),
            updating: repo.is_updating(),
            phase: repo.phase().to_string(),
            dimensions: repo.dimension_names(),
            missed_node_lookups: repo.missed_node_lookups(),
        }
    }
}
