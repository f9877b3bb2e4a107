use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use cs_history::HistoryConfig;
use cs_repo::RepoConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address of the socket protocol listener.
    pub socket_addr: SocketAddr,
    /// Address of the HTTP binding; `None` disables it.
    pub http_addr: Option<SocketAddr>,
    /// Prefix of every HTTP route.
    pub base_path: String,
    pub repo: RepoConfig,
    /// Directory for snapshot history; `None` keeps history in memory.
    pub history_dir: Option<PathBuf>,
    /// Timestamped snapshots kept in history.
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            http_addr: None,
            base_path: "/contentserver".into(),
            repo: RepoConfig::default(),
            history_dir: None,
            history_limit: HistoryConfig::default().limit,
        }
    }
}

impl ServerConfig {
    /// Read a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            limit: self.history_limit,
            ..Default::default()
        }
    }

    /// `base_path` with a leading and without a trailing slash; empty for the
    /// root.
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}
