use std::sync::Arc;

use cs_history::{FsStorage, History, InMemoryStorage, Storage};
use cs_repo::Repo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::socket::serve_socket;

/// ContentServer daemon.
pub struct ContentServer {
    config: ServerConfig,
    repo: Arc<Repo>,
}

impl ContentServer {
    /// Open history storage and start the repository.
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let storage: Arc<dyn Storage> = match &config.history_dir {
            Some(dir) => Arc::new(FsStorage::open(dir.clone()).await.map_err(cs_history::HistoryError::from)?),
            None => Arc::new(InMemoryStorage::new()),
        };
        let history = Arc::new(History::new(storage, config.history_config()));
        let repo = Repo::spawn(config.repo.clone(), history)?;
        Ok(Self {
            config,
            repo: Arc::new(repo),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn repo(&self) -> &Arc<Repo> {
        &self.repo
    }

    /// Build the HTTP router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.repo.clone(), &self.config.normalized_base_path())
    }

    /// Restore the last snapshot from history, then fetch a fresh one.
    ///
    /// Failures are logged; the server keeps running with whatever is
    /// loaded.
    pub async fn load(&self) {
        match self.repo.restore().await {
            Ok(response) if response.success => info!(
                nodes = response.stats.number_of_nodes,
                "restored repository from history"
            ),
            Ok(response) => info!(reason = %response.error_message, "nothing restored from history"),
            Err(e) => warn!(error = %e, "restore from history failed"),
        }
        let response = self.repo.update().await;
        if response.success {
            info!(
                nodes = response.stats.number_of_nodes,
                uris = response.stats.number_of_uris,
                "initial update succeeded"
            );
        } else {
            warn!(error = %response.error_message, "initial update failed");
        }
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                let _ = tx.send(true);
            }
        });
        self.serve_with_shutdown(rx).await
    }

    /// Serve until `shutdown` flips to `true`.
    pub async fn serve_with_shutdown(self, shutdown: watch::Receiver<bool>) -> ServerResult<()> {
        let socket = TcpListener::bind(self.config.socket_addr).await?;
        let http = match self.config.http_addr {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };
        self.load().await;

        let socket_task = tokio::spawn(serve_socket(socket, self.repo.clone(), shutdown.clone()));
        if let Some(listener) = http {
            info!(addr = %listener.local_addr()?, base = %self.config.normalized_base_path(), "HTTP listener started");
            let mut signal = shutdown.clone();
            axum::serve(listener, self.router())
                .with_graceful_shutdown(async move {
                    let _ = signal.wait_for(|stop| *stop).await;
                })
                .await
                .map_err(ServerError::Io)?;
        }

        let result = socket_task
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        self.repo.shutdown().await;
        result
    }
}
