//! ContentServer daemon.
//!
//! Serves a [`cs_repo::Repo`] over the socket protocol and, optionally, an
//! HTTP binding with the same routes and envelopes.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod socket;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::HealthResponse;
pub use server::ContentServer;
