//! Dimensions and the directory builder.
//!
//! A [`Dimension`] flattens a snapshot tree into an arena of [`RepoNode`]s and
//! indexes it twice: by node id (the *directory*) and by uri (the *URI
//! directory*). Building runs in three passes over a fresh arena:
//!
//! 1. `build_directory` copies every node into the arena and fills both
//!    indexes, failing on the first duplicate id or uri.
//! 2. `wire_aliases` rewrites the uri of every link node to its target's
//!    declared uri.
//! 3. `wire_parents` assigns each node's parent back-reference.
//!
//! The passes only ever touch the builder's own arena, so a failed build
//! leaves nothing behind.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::MergeError;
use crate::node::{RepoNode, SnapshotNode};

/// Position of a node in its dimension's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One independently versioned content tree with its lookup indexes.
#[derive(Clone)]
pub struct Dimension {
    name: String,
    nodes: Vec<RepoNode>,
    root: NodeIndex,
    directory: HashMap<String, NodeIndex>,
    uri_directory: HashMap<String, NodeIndex>,
}

impl Dimension {
    /// Build a dimension from a snapshot tree.
    pub fn build(name: impl Into<String>, root: &SnapshotNode) -> Result<Self, MergeError> {
        let mut builder = DirectoryBuilder::new(name.into(), root.count());
        let root = builder.build_directory(root)?;
        builder.wire_aliases()?;
        builder.wire_parents();
        let dimension = builder.finish(root);
        debug!(
            dimension = %dimension.name,
            nodes = dimension.len(),
            uris = dimension.uri_count(),
            "dimension built"
        );
        Ok(dimension)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_index(&self) -> NodeIndex {
        self.root
    }

    pub fn root(&self) -> &RepoNode {
        self.node(self.root)
    }

    /// Node at an arena index handed out by this dimension.
    pub fn node(&self, index: NodeIndex) -> &RepoNode {
        &self.nodes[index.0]
    }

    /// Look up a node by id.
    pub fn lookup(&self, id: &str) -> Option<NodeIndex> {
        self.directory.get(id).copied()
    }

    /// Look up a node by its declared uri.
    pub fn lookup_uri(&self, uri: &str) -> Option<NodeIndex> {
        self.uri_directory.get(uri).copied()
    }

    /// Number of nodes (size of the directory).
    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    /// Number of distinct uris (size of the URI directory).
    pub fn uri_count(&self) -> usize {
        self.uri_directory.len()
    }

    /// Children of `index` listed in its `index`, in that order.
    pub fn ordered_children(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.node(index)
            .index
            .iter()
            .filter_map(move |id| {
                self.lookup(id)
                    .filter(|child| self.node(*child).parent == Some(index))
            })
    }

    /// Ancestors of `index`, from the immediate parent up to the root.
    pub fn ancestors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut path = Vec::new();
        let mut current = self.node(index).parent;
        while let Some(parent) = current {
            path.push(parent);
            current = self.node(parent).parent;
        }
        path
    }

    /// Rebuild the snapshot tree this dimension was built from.
    pub fn to_snapshot(&self) -> SnapshotNode {
        // The arena is in pre-order, so walking it backwards finishes every
        // child before its parent.
        let mut built: Vec<SnapshotNode> = Vec::with_capacity(self.nodes.len());
        built.resize_with(self.nodes.len(), SnapshotNode::default);
        for position in (0..self.nodes.len()).rev() {
            let node = &self.nodes[position];
            let nodes = node
                .children
                .iter()
                .map(|child| (self.nodes[child.0].id.clone(), std::mem::take(&mut built[child.0])))
                .collect();
            built[position] = SnapshotNode {
                id: node.id.clone(),
                mime_type: node.mime_type.clone(),
                link_id: node.link_id.clone(),
                groups: node.groups.clone(),
                uri: node.declared_uri.clone(),
                name: node.name.clone(),
                hidden: node.hidden,
                destination_id: node.destination_id.clone(),
                data: node.data.clone(),
                nodes,
                index: node.index.clone(),
            };
        }
        std::mem::take(&mut built[self.root.0])
    }
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimension")
            .field("name", &self.name)
            .field("nodes", &self.len())
            .field("uris", &self.uri_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// DirectoryBuilder
// ---------------------------------------------------------------------------

struct DirectoryBuilder {
    dimension: String,
    nodes: Vec<RepoNode>,
    directory: HashMap<String, NodeIndex>,
    uri_directory: HashMap<String, NodeIndex>,
}

impl DirectoryBuilder {
    fn new(dimension: String, capacity: usize) -> Self {
        Self {
            dimension,
            nodes: Vec::with_capacity(capacity),
            directory: HashMap::with_capacity(capacity),
            uri_directory: HashMap::with_capacity(capacity),
        }
    }

    /// Copy the tree into the arena in pre-order, filling both directories.
    fn build_directory(&mut self, root: &SnapshotNode) -> Result<NodeIndex, MergeError> {
        let mut pending: Vec<(&SnapshotNode, Option<NodeIndex>)> = vec![(root, None)];
        while let Some((node, parent)) = pending.pop() {
            if self.directory.contains_key(&node.id) {
                return Err(MergeError::DuplicateNodeId {
                    dimension: self.dimension.clone(),
                    id: node.id.clone(),
                });
            }
            if self.uri_directory.contains_key(&node.uri) {
                return Err(MergeError::DuplicateUri {
                    dimension: self.dimension.clone(),
                    uri: node.uri.clone(),
                    id: node.id.clone(),
                });
            }

            let index = NodeIndex(self.nodes.len());
            self.nodes.push(RepoNode::from_snapshot(node));
            self.directory.insert(node.id.clone(), index);
            self.uri_directory.insert(node.uri.clone(), index);
            if let Some(parent) = parent {
                self.nodes[parent.0].children.push(index);
            }

            // Reversed so children come off the stack in declared order.
            for child_id in node.child_ids().into_iter().rev() {
                pending.push((&node.nodes[child_id], Some(index)));
            }
        }
        Ok(NodeIndex(0))
    }

    fn wire_aliases(&mut self) -> Result<(), MergeError> {
        let mut rewrites = Vec::new();
        for (position, node) in self.nodes.iter().enumerate() {
            if !node.is_alias() {
                continue;
            }
            let target = self
                .directory
                .get(&node.link_id)
                .ok_or_else(|| MergeError::DanglingLink {
                    dimension: self.dimension.clone(),
                    id: node.id.clone(),
                    link_id: node.link_id.clone(),
                })?;
            rewrites.push((position, self.nodes[target.0].declared_uri.clone()));
        }
        for (position, uri) in rewrites {
            self.nodes[position].uri = uri;
        }
        Ok(())
    }

    fn wire_parents(&mut self) {
        for parent in 0..self.nodes.len() {
            for child_slot in 0..self.nodes[parent].children.len() {
                let child = self.nodes[parent].children[child_slot];
                debug_assert!(self.nodes[child.0].parent.is_none(), "parent wired twice");
                self.nodes[child.0].parent = Some(NodeIndex(parent));
            }
        }
    }

    fn finish(self, root: NodeIndex) -> Dimension {
        Dimension {
            name: self.dimension,
            nodes: self.nodes,
            root,
            directory: self.directory,
            uri_directory: self.uri_directory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, uri: &str) -> SnapshotNode {
        SnapshotNode::new(id, uri)
    }

    fn site() -> SnapshotNode {
        node("root", "/")
            .with_child(node("a", "/a").with_child(node("ab", "/a/b")))
            .with_child(node("c", "/c"))
    }

    #[test]
    fn build_indexes_every_node() {
        let tree = site();
        let dim = Dimension::build("de", &tree).unwrap();
        assert_eq!(dim.name(), "de");
        assert_eq!(dim.len(), tree.count());
        assert_eq!(dim.uri_count(), 4);
        assert_eq!(dim.root().id, "root");

        let ab = dim.lookup("ab").unwrap();
        assert_eq!(dim.lookup_uri("/a/b"), Some(ab));
        assert_eq!(dim.node(ab).uri, "/a/b");
    }

    #[test]
    fn duplicate_id_fails() {
        let tree = node("root", "/")
            .with_child(node("a", "/a"))
            .with_child(node("b", "/b").with_child(node("a", "/b/a")));
        let err = Dimension::build("de", &tree).unwrap_err();
        assert_eq!(
            err,
            MergeError::DuplicateNodeId {
                dimension: "de".into(),
                id: "a".into()
            }
        );
    }

    #[test]
    fn duplicate_uri_fails() {
        let tree = node("root", "/")
            .with_child(node("a", "/same"))
            .with_child(node("b", "/same"));
        let err = Dimension::build("de", &tree).unwrap_err();
        assert!(matches!(err, MergeError::DuplicateUri { ref uri, .. } if uri == "/same"));
    }

    #[test]
    fn alias_takes_target_uri() {
        let mut alias = node("alias", "/alias");
        alias.link_id = "c".into();
        let tree = site().with_child(alias);
        let dim = Dimension::build("de", &tree).unwrap();

        let alias = dim.node(dim.lookup("alias").unwrap());
        assert_eq!(alias.uri, "/c");
        // The URI directory keeps the alias under its declared uri.
        assert_eq!(dim.lookup_uri("/alias"), dim.lookup("alias"));
    }

    #[test]
    fn alias_substitution_is_single_level() {
        let mut first = node("first", "/first");
        first.link_id = "second".into();
        let mut second = node("second", "/second");
        second.link_id = "c".into();
        let tree = site().with_child(first).with_child(second);
        let dim = Dimension::build("de", &tree).unwrap();

        assert_eq!(dim.node(dim.lookup("first").unwrap()).uri, "/second");
        assert_eq!(dim.node(dim.lookup("second").unwrap()).uri, "/c");
    }

    #[test]
    fn dangling_link_fails() {
        let mut alias = node("alias", "/alias");
        alias.link_id = "nowhere".into();
        let err = Dimension::build("de", &site().with_child(alias)).unwrap_err();
        assert!(matches!(err, MergeError::DanglingLink { ref link_id, .. } if link_id == "nowhere"));
    }

    #[test]
    fn parents_and_ancestors() {
        let dim = Dimension::build("de", &site()).unwrap();
        let ab = dim.lookup("ab").unwrap();
        let a = dim.lookup("a").unwrap();
        assert_eq!(dim.node(ab).parent(), Some(a));
        assert_eq!(dim.root().parent(), None);

        let ancestors: Vec<&str> = dim
            .ancestors(ab)
            .into_iter()
            .map(|i| dim.node(i).id.as_str())
            .collect();
        assert_eq!(ancestors, vec!["a", "root"]);
    }

    #[test]
    fn ordered_children_follow_index() {
        let mut tree = node("root", "/")
            .with_child(node("z", "/z"))
            .with_child(node("m", "/m"));
        tree.nodes.insert("unlisted".into(), node("unlisted", "/unlisted"));
        let dim = Dimension::build("de", &tree).unwrap();

        let order: Vec<&str> = dim
            .ordered_children(dim.root_index())
            .map(|i| dim.node(i).id.as_str())
            .collect();
        assert_eq!(order, vec!["z", "m"]);
        assert!(dim.lookup("unlisted").is_some());
        assert_eq!(dim.root().children().len(), 3);
    }

    #[test]
    fn deep_chain_builds_and_rebuilds() {
        let depth = 500;
        let mut tree = node(&format!("n{depth}"), &format!("/n{depth}"));
        for level in (0..depth).rev() {
            tree = node(&format!("n{level}"), &format!("/n{level}")).with_child(tree);
        }
        let dim = Dimension::build("de", &tree).unwrap();
        assert_eq!(dim.len(), depth + 1);

        let leaf = dim.lookup(&format!("n{depth}")).unwrap();
        assert_eq!(dim.ancestors(leaf).len(), depth);
        assert_eq!(dim.node(leaf).parent(), dim.lookup(&format!("n{}", depth - 1)));
        assert_eq!(dim.to_snapshot(), tree);
    }

    #[test]
    fn arena_is_pre_order() {
        let dim = Dimension::build("de", &site()).unwrap();
        let order: Vec<&str> = (0..dim.len())
            .map(|i| dim.node(NodeIndex(i)).id.as_str())
            .collect();
        assert_eq!(order, vec!["root", "a", "ab", "c"]);
        let children: Vec<&str> = dim
            .root()
            .children()
            .iter()
            .map(|i| dim.node(*i).id.as_str())
            .collect();
        assert_eq!(children, vec!["a", "c"]);
    }

    #[test]
    fn snapshot_round_trip_ignores_alias_rewrite() {
        let mut alias = node("alias", "/alias");
        alias.link_id = "a".into();
        let tree = site().with_child(alias);
        let dim = Dimension::build("de", &tree).unwrap();
        assert_eq!(dim.to_snapshot(), tree);
    }
}
