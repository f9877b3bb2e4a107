//! Client-facing projections of published content.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn is_false(value: &bool) -> bool {
    !*value
}

/// A resolved node payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(rename = "URI")]
    pub uri: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// A projected subtree: an item plus the children that passed filtering.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub item: Item,
    #[serde(default)]
    pub nodes: HashMap<String, Node>,
    /// Order of `nodes`, copied from the repo node's index.
    #[serde(default)]
    pub index: Vec<String>,
}

impl Node {
    pub fn new(item: Item) -> Self {
        Self {
            item,
            nodes: HashMap::new(),
            index: Vec::new(),
        }
    }

    /// Children in index order.
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.index.iter().filter_map(|id| self.nodes.get(id))
    }
}

/// Outcome of a content lookup, serialized as an HTTP-like status number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum ContentStatus {
    Ok,
    Forbidden,
    #[default]
    NotFound,
}

impl From<ContentStatus> for u16 {
    fn from(status: ContentStatus) -> Self {
        match status {
            ContentStatus::Ok => 200,
            ContentStatus::Forbidden => 403,
            ContentStatus::NotFound => 404,
        }
    }
}

impl TryFrom<u16> for ContentStatus {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            200 => Ok(Self::Ok),
            403 => Ok(Self::Forbidden),
            404 => Ok(Self::NotFound),
            other => Err(format!("unknown content status {other}")),
        }
    }
}

/// Answer to a content request.
///
/// Navigation trees in `nodes` are present even when the primary lookup
/// missed or was forbidden.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteContent {
    pub status: ContentStatus,
    #[serde(rename = "URI")]
    pub uri: String,
    pub dimension: String,
    pub mime_type: String,
    pub item: Option<Item>,
    /// Data of the resolved node; empty unless access was granted.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Ancestors of the resolved node, from its parent up to the root.
    #[serde(default)]
    pub path: Vec<Item>,
    /// Effective uri of the resolved node in every published dimension.
    #[serde(rename = "URIs", default)]
    pub uris: HashMap<String, String>,
    #[serde(default)]
    pub nodes: HashMap<String, Node>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_as_number() {
        assert_eq!(serde_json::to_value(ContentStatus::Forbidden).unwrap(), json!(403));
        let status: ContentStatus = serde_json::from_value(json!(200)).unwrap();
        assert_eq!(status, ContentStatus::Ok);
        assert!(serde_json::from_value::<ContentStatus>(json!(500)).is_err());
    }

    #[test]
    fn item_omits_hidden_when_false() {
        let item = Item {
            id: "a".into(),
            uri: "/a".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("hidden").is_none());
        assert_eq!(value["URI"], "/a");
    }

    #[test]
    fn node_children_in_index_order() {
        let mut node = Node::new(Item::default());
        for id in ["c", "a", "b"] {
            node.nodes.insert(
                id.into(),
                Node::new(Item {
                    id: id.into(),
                    ..Default::default()
                }),
            );
            node.index.push(id.into());
        }
        let order: Vec<&str> = node.children().map(|n| n.item.id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }
}
