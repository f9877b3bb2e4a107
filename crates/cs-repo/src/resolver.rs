//! Read-side algorithms over a set of published dimensions.
//!
//! Everything here works on an immutable [`Dimensions`] value the caller took
//! from the shared state, so no lock is held while resolving.

use std::collections::HashMap;

use cs_model::{
    ContentRequest, ContentStatus, Dimension, Env, Node, NodeIndex, NodeRequest, RepoNode,
    SiteContent,
};
use tracing::{debug, error};

use crate::error::{RepoError, RepoResult};
use crate::state::Dimensions;

/// Hard cap on alias hops when computing a node's uri.
pub const MAX_ALIAS_HOPS: usize = 1000;

/// A uri lookup hit.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub dimension: &'a Dimension,
    pub index: NodeIndex,
    /// The (possibly shortened) uri that matched.
    pub uri: String,
}

impl<'a> Resolved<'a> {
    pub fn node(&self) -> &'a RepoNode {
        self.dimension.node(self.index)
    }
}

/// The uri itself followed by each shorter path prefix down to `/`.
fn uri_prefixes(uri: &str) -> Vec<&str> {
    let mut prefixes = vec![uri];
    let mut rest = uri;
    while let Some(pos) = rest.rfind('/') {
        rest = &rest[..pos];
        let prefix = if rest.is_empty() { "/" } else { rest };
        if prefixes.last() != Some(&prefix) {
            prefixes.push(prefix);
        }
        if rest.is_empty() {
            break;
        }
    }
    prefixes
}

/// Longest-prefix uri resolution across dimensions in priority order.
///
/// A node with a `destinationId` hands over to its destination node, one hop
/// only.
pub fn resolve_content<'a>(
    published: &'a Dimensions,
    dimensions: &[String],
    uri: &str,
) -> RepoResult<Resolved<'a>> {
    let prefixes = uri_prefixes(uri);
    for name in dimensions {
        let Some(dimension) = published.get(name) else {
            continue;
        };
        for prefix in &prefixes {
            let Some(mut index) = dimension.lookup_uri(prefix) else {
                continue;
            };
            let node = dimension.node(index);
            if !node.destination_id.is_empty() {
                if let Some(destination) = dimension.lookup(&node.destination_id) {
                    index = destination;
                }
            }
            return Ok(Resolved {
                dimension,
                index,
                uri: (*prefix).to_string(),
            });
        }
    }
    Err(RepoError::NotFound(uri.to_string()))
}

/// Effective uri of a node, following alias links.
///
/// Gives up with an empty string after [`MAX_ALIAS_HOPS`] hops or when a
/// link target is missing.
pub fn uri_for_node(dimension: &Dimension, index: NodeIndex) -> String {
    let mut node = dimension.node(index);
    for _ in 0..=MAX_ALIAS_HOPS {
        if !node.is_alias() {
            return node.uri.clone();
        }
        match dimension.lookup(&node.link_id) {
            Some(target) => node = dimension.node(target),
            None => return String::new(),
        }
    }
    error!(
        dimension = dimension.name(),
        id = %dimension.node(index).id,
        max = MAX_ALIAS_HOPS,
        "alias chain too long, giving up"
    );
    String::new()
}

/// `Forbidden` unless the groups may see the node.
pub fn check_access(node: &RepoNode, groups: &[String]) -> RepoResult<()> {
    if node.can_be_accessed_by_groups(groups) {
        Ok(())
    } else {
        Err(RepoError::Forbidden(node.id.clone()))
    }
}

/// Filters applied while projecting a subtree.
#[derive(Clone, Copy, Debug)]
pub struct Projection<'a> {
    pub expand: bool,
    pub expose_hidden: bool,
    pub mime_types: &'a [String],
    pub groups: &'a [String],
    /// Ids of nodes on the already-resolved path; their children are shown
    /// even without `expand`.
    pub path: &'a [String],
    pub data_fields: Option<&'a [String]>,
}

impl<'a> Projection<'a> {
    pub fn for_request(request: &'a NodeRequest, env: &'a Env, path: &'a [String]) -> Self {
        Self {
            expand: request.expand,
            expose_hidden: request.expose_hidden_nodes,
            mime_types: &request.mime_types,
            groups: &env.groups,
            path,
            data_fields: request.data_fields.as_deref(),
        }
    }

    fn includes(&self, child: &RepoNode, level: usize) -> bool {
        (level == 0 || self.expand || self.path.contains(&child.id))
            && (!child.hidden || self.expose_hidden)
            && child.can_be_accessed_by_groups(self.groups)
            && child.is_one_of_these_mime_types(self.mime_types)
    }
}

/// Project the subtree under `index`, children in index order.
pub fn get_node(dimension: &Dimension, index: NodeIndex, projection: &Projection<'_>) -> Node {
    // Included nodes in pre-order, each with the position of its parent.
    let mut order: Vec<(NodeIndex, usize)> = vec![(index, 0)];
    let mut pending = vec![(0, 0)];
    while let Some((position, level)) = pending.pop() {
        let current = order[position].0;
        for child in dimension.ordered_children(current) {
            if projection.includes(dimension.node(child), level) {
                order.push((child, position));
                pending.push((order.len() - 1, level + 1));
            }
        }
    }

    let mut built: Vec<Node> = order
        .iter()
        .map(|(index, _)| Node::new(dimension.node(*index).to_item(projection.data_fields)))
        .collect();
    // Children sit after their parent, so a backwards pass attaches every
    // finished subtree. Siblings arrive last-first and are reversed once
    // their parent is complete.
    for position in (1..order.len()).rev() {
        let mut node = std::mem::take(&mut built[position]);
        node.index.reverse();
        let parent = &mut built[order[position].1];
        parent.index.push(node.item.id.clone());
        parent.nodes.insert(node.item.id.clone(), node);
    }
    let mut root = std::mem::take(&mut built[0]);
    root.index.reverse();
    root
}

/// Resolve a batch of node requests.
///
/// Entries whose dimension or id cannot be found are left out; the second
/// value counts them.
pub fn get_nodes(
    published: &Dimensions,
    env: &Env,
    requests: &HashMap<String, NodeRequest>,
    path: &[String],
) -> (HashMap<String, Node>, usize) {
    let mut nodes = HashMap::with_capacity(requests.len());
    let mut missed = 0;
    for (name, request) in requests {
        let target = if request.dimension.is_empty() {
            env.dimensions.iter().find_map(|dimension| {
                let dimension = published.get(dimension)?;
                Some((dimension, dimension.lookup(&request.id)?))
            })
        } else {
            published
                .get(&request.dimension)
                .and_then(|dimension| Some((dimension, dimension.lookup(&request.id)?)))
        };
        match target {
            Some((dimension, index)) => {
                let projection = Projection::for_request(request, env, path);
                nodes.insert(name.clone(), get_node(dimension, index, &projection));
            }
            None => {
                debug!(%name, id = %request.id, dimension = %request.dimension, "node not found");
                missed += 1;
            }
        }
    }
    (nodes, missed)
}

/// Effective uris for a list of ids in one dimension; unknown ids are left out.
pub fn get_uris(
    published: &Dimensions,
    dimension: &str,
    ids: &[String],
) -> RepoResult<HashMap<String, String>> {
    let dim = published
        .get(dimension)
        .ok_or_else(|| unknown_dimension(published, dimension))?;
    Ok(ids
        .iter()
        .filter_map(|id| Some((id.clone(), uri_for_node(dim, dim.lookup(id)?))))
        .collect())
}

fn unknown_dimension(published: &Dimensions, dimension: &str) -> RepoError {
    let mut available: Vec<&str> = published.keys().map(String::as_str).collect();
    available.sort_unstable();
    RepoError::Validation(format!(
        "unknown dimension {dimension:?}, available dimensions: [{}]",
        available.join(", ")
    ))
}

fn validate_content_request<'r>(
    published: &Dimensions,
    request: &'r ContentRequest,
) -> RepoResult<&'r Env> {
    if request.uri.is_empty() {
        return Err(RepoError::Validation("request URI must not be empty".into()));
    }
    let env = request
        .env
        .as_ref()
        .ok_or_else(|| RepoError::Validation("request env must be set".into()))?;
    if env.dimensions.is_empty() {
        return Err(RepoError::Validation(
            "request env must name at least one dimension".into(),
        ));
    }
    if let Some(unknown) = env
        .dimensions
        .iter()
        .find(|dimension| !published.contains_key(*dimension))
    {
        return Err(unknown_dimension(published, unknown));
    }
    Ok(env)
}

/// Answer a content request.
///
/// Navigation trees are always resolved, even when the uri misses or is
/// forbidden. The second value counts node requests that could not be
/// resolved.
pub fn get_content(
    published: &Dimensions,
    request: &ContentRequest,
) -> RepoResult<(SiteContent, usize)> {
    let env = validate_content_request(published, request)?;
    let data_fields = request.data_fields.as_deref();

    let mut content = SiteContent::default();
    let mut path = Vec::new();
    match resolve_content(published, &env.dimensions, &request.uri) {
        Ok(resolved) => {
            let node = resolved.node();
            let dimension = resolved.dimension;
            content.uri = resolved.uri.clone();
            content.dimension = dimension.name().to_string();
            content.mime_type = node.mime_type.clone();

            let ancestors = dimension.ancestors(resolved.index);
            match check_access(node, &env.groups) {
                Ok(()) => {
                    let item = node.to_item(data_fields);
                    content.status = ContentStatus::Ok;
                    content.data = item.data.clone();
                    content.item = Some(item);
                    content.path = ancestors
                        .iter()
                        .map(|ancestor| dimension.node(*ancestor).to_item(data_fields))
                        .collect();
                }
                Err(e) => {
                    debug!(uri = %request.uri, error = %e, "content forbidden");
                    content.status = ContentStatus::Forbidden;
                }
            }

            content.uris = published
                .iter()
                .filter_map(|(name, other)| {
                    let index = other.lookup(&node.id)?;
                    Some((name.clone(), uri_for_node(other, index)))
                })
                .collect();

            path.push(node.id.clone());
            path.extend(ancestors.iter().map(|a| dimension.node(*a).id.clone()));
        }
        Err(e) => {
            debug!(error = %e, "content miss");
            content.status = ContentStatus::NotFound;
            content.uri = request.uri.clone();
            content.dimension = env.dimensions[0].clone();
        }
    }

    let (nodes, missed) = get_nodes(published, env, &request.nodes, &path);
    content.nodes = nodes;
    Ok((content, missed))
}
