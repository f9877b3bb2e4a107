use serde::{Deserialize, Serialize};

/// Counters reported with every update outcome.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStats {
    pub number_of_nodes: usize,
    pub number_of_uris: usize,
    /// Seconds spent fetching the snapshot from upstream.
    pub repo_runtime: f64,
    /// Seconds spent on the whole update, fetch included.
    pub own_runtime: f64,
}

/// Outcome of an update. Failures are reported here, not as API errors.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub success: bool,
    #[serde(rename = "error", default)]
    pub error_message: String,
    #[serde(default)]
    pub stats: UpdateStats,
}

impl UpdateResponse {
    pub fn succeeded(stats: UpdateStats) -> Self {
        Self {
            success: true,
            error_message: String::new(),
            stats,
        }
    }

    pub fn failed(message: impl Into<String>, stats: UpdateStats) -> Self {
        Self {
            success: false,
            error_message: message.into(),
            stats,
        }
    }
}
