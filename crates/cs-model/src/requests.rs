//! Request bodies accepted by the repository API.
//!
//! Field names follow the JSON wire format; every field is optional on the
//! wire and defaults to empty.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Caller environment: dimensions in priority order plus access groups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Env {
    pub dimensions: Vec<String>,
    pub groups: Vec<String>,
}

impl Env {
    pub fn new<D, G>(dimensions: D, groups: G) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

/// A request for one projected subtree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeRequest {
    pub id: String,
    /// Explicit dimension; empty means the first caller dimension holding `id`.
    pub dimension: String,
    pub mime_types: Vec<String>,
    pub expand: bool,
    pub expose_hidden_nodes: bool,
    pub data_fields: Option<Vec<String>>,
}

impl NodeRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn expanded(mut self) -> Self {
        self.expand = true;
        self
    }

    pub fn in_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimension = dimension.into();
        self
    }
}

/// Body of `getContent`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentRequest {
    pub env: Option<Env>,
    #[serde(rename = "URI")]
    pub uri: String,
    pub nodes: HashMap<String, NodeRequest>,
    pub data_fields: Option<Vec<String>>,
}

impl ContentRequest {
    pub fn new(env: Env, uri: impl Into<String>) -> Self {
        Self {
            env: Some(env),
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn with_node(mut self, name: impl Into<String>, node: NodeRequest) -> Self {
        self.nodes.insert(name.into(), node);
        self
    }
}

/// Body of `getURIs`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrisRequest {
    pub dimension: String,
    pub ids: Vec<String>,
}

/// Body of `getNodes`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodesRequest {
    pub env: Option<Env>,
    pub nodes: HashMap<String, NodeRequest>,
}
