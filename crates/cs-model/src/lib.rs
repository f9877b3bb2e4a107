//! Content model for ContentServer.
//!
//! A repository is a set of independently versioned content trees, one per
//! *dimension* (typically a site/locale combination). This crate defines the
//! tree as it arrives in a snapshot, the flat indexes built over it, and the
//! projections handed back to clients.
//!
//! # Key Types
//!
//! - [`SnapshotNode`]: a tree node in the JSON snapshot grammar
//! - [`Dimension`]: a fully built tree with id and URI directories
//! - [`RepoNode`]: a published node inside a [`Dimension`]
//! - [`Item`] / [`Node`]: resolved payloads returned to clients
//! - [`SiteContent`]: the answer to a content request
//!
//! # Build Rules
//!
//! 1. Node ids are unique within a dimension.
//! 2. URIs are unique within a dimension.
//! 3. Every `linkId` resolves to a node of the same dimension.
//! 4. A [`Dimension`] only exists fully built; a failed build yields nothing.

pub mod content;
pub mod dimension;
pub mod error;
pub mod node;
pub mod requests;
pub mod responses;
pub mod snapshot;

pub use content::{ContentStatus, Item, Node, SiteContent};
pub use dimension::{Dimension, NodeIndex};
pub use error::{MergeError, ModelError, ModelResult};
pub use node::{RepoNode, SnapshotNode};
pub use requests::{ContentRequest, Env, NodeRequest, NodesRequest, UrisRequest};
pub use responses::{UpdateResponse, UpdateStats};
pub use snapshot::{from_json_slice, parse_snapshot, Snapshot};
