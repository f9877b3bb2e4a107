use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use cs_protocol::{ErrorCode, ErrorPayload};
use cs_repo::Repo;
use tower_http::trace::TraceLayer;

use crate::handler::{self, HealthResponse};

/// Build the HTTP binding: `POST {base_path}/{route}` plus `GET /health`.
///
/// `base_path` must be empty or start with `/` and not end with one.
pub fn build_router(repo: Arc<Repo>, base_path: &str) -> Router {
    let api = Router::new().route("/:route", post(route_handler));
    let router = if base_path.is_empty() {
        api
    } else {
        Router::new().nest(base_path, api)
    };
    router
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(repo)
}

async fn route_handler(State(repo): State<Arc<Repo>>, Path(route): Path<String>, body: Bytes) -> Response {
    if body.is_empty() {
        let payload = ErrorPayload::new(ErrorCode::MalformedJson, "empty request body");
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    }
    match handler::dispatch(&repo, &route, &body).await {
        Ok(reply) => ([(header::CONTENT_TYPE, "application/json")], reply).into_response(),
        Err(payload) => {
            let status = if payload.code == ErrorCode::UnknownRoute as u32 {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(payload)).into_response()
        }
    }
}

async fn health_handler(State(repo): State<Arc<Repo>>) -> Json<HealthResponse> {
    Json(HealthResponse::of(&repo))
}
