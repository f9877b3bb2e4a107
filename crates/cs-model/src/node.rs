//! Repo nodes in their two shapes: the snapshot tree as it is fetched and
//! persisted, and the published node living inside a [`Dimension`].
//!
//! [`Dimension`]: crate::Dimension

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::content::Item;
use crate::dimension::NodeIndex;

/// Upstream encoders emit `null` for empty collections and strings.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// SnapshotNode
// ---------------------------------------------------------------------------

/// A content tree node in the snapshot grammar.
///
/// Children live in `nodes`, keyed by id; `index` carries their order. A
/// child missing from `index` is still part of the dimension (it is indexed
/// and addressable) but is never emitted in tree projections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mime_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub link_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub groups: Vec<String>,
    #[serde(rename = "URI", default, deserialize_with = "null_as_default")]
    pub uri: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hidden: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub destination_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: HashMap<String, SnapshotNode>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: Vec<String>,
}

impl SnapshotNode {
    /// Create a leaf node with an id and uri.
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Append a child, keeping `index` in insertion order.
    pub fn add_child(&mut self, child: SnapshotNode) {
        self.index.push(child.id.clone());
        self.nodes.insert(child.id.clone(), child);
    }

    /// Builder-style variant of [`Self::add_child`].
    pub fn with_child(mut self, child: SnapshotNode) -> Self {
        self.add_child(child);
        self
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            count += 1;
            pending.extend(node.nodes.values());
        }
        count
    }

    /// Child ids in projection order first, then any unlisted children
    /// sorted by id.
    pub(crate) fn child_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut ids: Vec<&str> = self
            .index
            .iter()
            .map(String::as_str)
            .filter(|id| self.nodes.contains_key(*id) && seen.insert(*id))
            .collect();
        let mut unlisted: Vec<&str> = self
            .nodes
            .keys()
            .map(String::as_str)
            .filter(|id| !seen.contains(id))
            .collect();
        unlisted.sort_unstable();
        ids.extend(unlisted);
        ids
    }
}

// ---------------------------------------------------------------------------
// RepoNode
// ---------------------------------------------------------------------------

/// A node published inside a dimension.
///
/// The dimension owns every node in a flat arena; children and the parent are
/// arena indexes. The parent link is only used for path computation and is
/// never serialized.
#[derive(Clone, Debug, PartialEq)]
pub struct RepoNode {
    pub id: String,
    pub mime_type: String,
    pub link_id: String,
    pub groups: Vec<String>,
    /// Effective uri. For alias nodes this is the link target's uri.
    pub uri: String,
    pub name: String,
    pub hidden: bool,
    pub destination_id: String,
    pub data: Map<String, Value>,
    /// Child ids in projection order, as declared by the snapshot.
    pub index: Vec<String>,
    pub(crate) declared_uri: String,
    pub(crate) children: Vec<NodeIndex>,
    pub(crate) parent: Option<NodeIndex>,
}

impl RepoNode {
    pub(crate) fn from_snapshot(node: &SnapshotNode) -> Self {
        Self {
            id: node.id.clone(),
            mime_type: node.mime_type.clone(),
            link_id: node.link_id.clone(),
            groups: node.groups.clone(),
            uri: node.uri.clone(),
            name: node.name.clone(),
            hidden: node.hidden,
            destination_id: node.destination_id.clone(),
            data: node.data.clone(),
            index: node.index.clone(),
            declared_uri: node.uri.clone(),
            children: Vec::new(),
            parent: None,
        }
    }

    /// Arena index of the parent node, `None` for the root.
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    /// Arena indexes of all children.
    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    /// Returns `true` if this node borrows its uri from another node.
    pub fn is_alias(&self) -> bool {
        !self.link_id.is_empty()
    }

    /// A node without groups is public; otherwise one of the caller's groups
    /// must match one of the node's groups.
    pub fn can_be_accessed_by_groups(&self, groups: &[String]) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        groups.iter().any(|group| self.groups.contains(group))
    }

    /// An empty filter matches every mime type.
    pub fn is_one_of_these_mime_types(&self, mime_types: &[String]) -> bool {
        mime_types.is_empty() || mime_types.iter().any(|m| *m == self.mime_type)
    }

    /// Project this node into a client-facing [`Item`].
    ///
    /// With `data_fields` set, only those keys of `data` are copied.
    pub fn to_item(&self, data_fields: Option<&[String]>) -> Item {
        let data = match data_fields {
            None => self.data.clone(),
            Some(fields) => fields
                .iter()
                .filter_map(|field| {
                    self.data
                        .get(field)
                        .map(|value| (field.clone(), value.clone()))
                })
                .collect(),
        };
        Item {
            id: self.id.clone(),
            name: self.name.clone(),
            uri: self.uri.clone(),
            mime_type: self.mime_type.clone(),
            hidden: self.hidden,
            data,
            groups: self.groups.clone(),
        }
    }
}
