use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ModelResult;
use crate::node::SnapshotNode;

/// A full repository snapshot: dimension name → root node.
pub type Snapshot = BTreeMap<String, SnapshotNode>;

/// Decode raw snapshot bytes as fetched from upstream or read from history.
pub fn parse_snapshot(bytes: &[u8]) -> ModelResult<Snapshot> {
    Ok(from_json_slice(bytes)?)
}

/// Decode JSON without a nesting limit.
///
/// Every tree level is two JSON levels deep, so serde_json's default limit
/// would cap trees at about 64 levels. The stack grows on demand instead.
pub fn from_json_slice<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
    let mut json = serde_json::Deserializer::from_slice(bytes);
    json.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut json))?;
    json.end()?;
    Ok(value)
}
