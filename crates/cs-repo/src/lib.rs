//! Content repository engine for ContentServer.
//!
//! A [`Repo`] owns the published dimensions and keeps them fresh:
//!
//! - updates run through a single-flight pipeline (fetch, parse, merge,
//!   publish); a request arriving while another is in flight is rejected
//! - every dimension of a snapshot is built before any of them is
//!   published, so a failed update leaves the served state untouched
//! - the last good snapshot is kept in [`cs_history::History`] and replayed
//!   on start and after a failed update
//!
//! Reads (`get_content`, `get_nodes`, `get_uris`, `get_repo`) never block on
//! a running update.

pub mod config;
pub mod error;
mod pipeline;
pub mod repo;
pub mod resolver;
pub mod source;
pub mod state;

pub use config::RepoConfig;
pub use error::{RepoError, RepoResult};
pub use repo::Repo;
pub use source::{source_for, FileSource, HttpSource, Source};
pub use state::{Dimensions, UpdatePhase};
