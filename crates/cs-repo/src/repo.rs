use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use cs_history::History;
use cs_model::{ContentRequest, Env, Node, NodeRequest, SiteContent, Snapshot, UpdateResponse, UpdateStats};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::RepoConfig;
use crate::error::{RepoError, RepoResult};
use crate::pipeline::{self, UpdateKind, UpdateTrigger};
use crate::resolver;
use crate::source::{source_for, Source};
use crate::state::{Shared, UpdatePhase};

/// The content repository: published dimensions plus the tasks that keep
/// them fresh.
pub struct Repo {
    config: RepoConfig,
    shared: Arc<Shared>,
    history: Arc<History>,
    trigger: UpdateTrigger,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Repo {
    /// Start a repository fetching from `config.source`.
    ///
    /// Must be called inside a tokio runtime. Nothing is loaded yet; call
    /// [`Repo::restore`] and/or [`Repo::update`] afterwards.
    pub fn spawn(config: RepoConfig, history: Arc<History>) -> RepoResult<Self> {
        let source = source_for(&config.source, config.fetch_timeout)?;
        Ok(Self::with_source(config, source, history))
    }

    /// Start a repository over an explicit source.
    pub fn with_source(config: RepoConfig, source: Arc<dyn Source>, history: Arc<History>) -> Self {
        let shared = Arc::new(Shared::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = pipeline::spawn(source, history.clone(), shared.clone(), shutdown_rx.clone());

        let mut handles = vec![tasks.coordinator, tasks.merger];
        if let Some(every) = config.poll_interval {
            info!(interval = ?every, source = %config.source, "polling upstream");
            handles.push(tokio::spawn(poll(tasks.trigger.clone(), every, shutdown_rx)));
        }

        Self {
            config,
            shared,
            history,
            trigger: tasks.trigger,
            shutdown,
            tasks: Mutex::new(handles),
        }
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Fetch from upstream and load. Never fails; problems are reported in
    /// the response.
    pub async fn update(&self) -> UpdateResponse {
        match self.try_update().await {
            Ok(response) => response,
            Err(e) => UpdateResponse::failed(e.to_string(), self.shared.stats()),
        }
    }

    /// Like [`Repo::update`], but a rejected or aborted request is an error.
    pub async fn try_update(&self) -> RepoResult<UpdateResponse> {
        self.trigger.request(UpdateKind::Fetch).await
    }

    /// Load the current history entry, if any.
    pub async fn restore(&self) -> RepoResult<UpdateResponse> {
        self.trigger.request(UpdateKind::Restore).await
    }

    pub fn get_content(&self, request: &ContentRequest) -> RepoResult<SiteContent> {
        let dimensions = self.shared.dimensions();
        let (content, missed) = resolver::get_content(&dimensions, request)?;
        self.shared.record_missed_nodes(missed);
        Ok(content)
    }

    pub fn get_uris(&self, dimension: &str, ids: &[String]) -> RepoResult<HashMap<String, String>> {
        resolver::get_uris(&self.shared.dimensions(), dimension, ids)
    }

    /// Resolve a batch of node requests outside of a content lookup.
    pub fn get_nodes(
        &self,
        env: Option<&Env>,
        requests: &HashMap<String, NodeRequest>,
    ) -> RepoResult<HashMap<String, Node>> {
        let env = env.ok_or_else(|| RepoError::Validation("request env must be set".into()))?;
        let (nodes, missed) = resolver::get_nodes(&self.shared.dimensions(), env, requests, &[]);
        self.shared.record_missed_nodes(missed);
        Ok(nodes)
    }

    /// The raw bytes of the published snapshot; empty before the first load.
    pub fn get_repo(&self) -> Bytes {
        self.shared.raw()
    }

    /// Rebuild the published snapshot from the in-memory trees.
    pub fn snapshot(&self) -> Snapshot {
        self.shared
            .dimensions()
            .iter()
            .map(|(name, dimension)| (name.clone(), dimension.to_snapshot()))
            .collect()
    }

    /// Published dimension names, sorted.
    pub fn dimension_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.dimensions().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// `false` until the first snapshot has been published.
    pub fn is_loaded(&self) -> bool {
        self.shared.is_loaded()
    }

    pub fn phase(&self) -> UpdatePhase {
        self.shared.phase()
    }

    pub fn is_updating(&self) -> bool {
        self.trigger.is_in_flight()
    }

    /// Node and uri counts of the published state.
    pub fn stats(&self) -> UpdateStats {
        self.shared.stats()
    }

    /// Node requests that could not be resolved since start.
    pub fn missed_node_lookups(&self) -> u64 {
        self.shared.missed_node_lookups()
    }

    /// Stop background tasks and close history storage.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handles = std::mem::take(&mut *self.tasks.lock().expect("tasks lock poisoned"));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "repository task ended abnormally");
            }
        }
        self.history.close().await;
        debug!("repository stopped");
    }
}

impl Drop for Repo {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn poll(trigger: UpdateTrigger, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => match trigger.request(UpdateKind::Poll).await {
                Ok(response) if response.success => {}
                Ok(response) => warn!(error = %response.error_message, "scheduled update failed"),
                Err(RepoError::UpdateRejected) => debug!("scheduled update skipped, one is in flight"),
                Err(RepoError::ShuttingDown) => break,
                Err(e) => warn!(error = %e, "scheduled update failed"),
            },
        }
    }
    debug!("poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cs_history::{HistoryConfig, InMemoryStorage};
    use cs_model::{ContentStatus, SnapshotNode};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Serves whatever bytes it was last given.
    struct StaticSource {
        body: Mutex<Bytes>,
        fetches: AtomicUsize,
    }

    impl StaticSource {
        fn new(body: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                body: Mutex::new(Bytes::from(body.to_string())),
                fetches: AtomicUsize::new(0),
            })
        }

        fn set(&self, body: serde_json::Value) {
            *self.body.lock().unwrap() = Bytes::from(body.to_string());
        }
    }

    #[async_trait]
    impl Source for StaticSource {
        async fn fetch(&self) -> RepoResult<Bytes> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.lock().unwrap().clone())
        }

        fn locator(&self) -> &str {
            "static"
        }
    }

    /// Blocks every fetch until released.
    struct GatedSource {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Source for GatedSource {
        async fn fetch(&self) -> RepoResult<Bytes> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Bytes::from(site().to_string()))
        }

        fn locator(&self) -> &str {
            "gated"
        }
    }

    struct FailingSource;

    #[async_trait]
    impl Source for FailingSource {
        async fn fetch(&self) -> RepoResult<Bytes> {
            Err(RepoError::Transport("upstream down".into()))
        }

        fn locator(&self) -> &str {
            "failing"
        }
    }

    fn history() -> Arc<History> {
        Arc::new(History::new(Arc::new(InMemoryStorage::new()), HistoryConfig::default()))
    }

    fn repo(source: Arc<dyn Source>) -> Repo {
        Repo::with_source(RepoConfig::new("test"), source, history())
    }

    fn site() -> serde_json::Value {
        json!({
            "de": {
                "id": "root", "URI": "/", "index": ["a", "b"],
                "nodes": {
                    "a": {
                        "id": "a", "URI": "/a", "mimeType": "page", "index": ["ab"],
                        "nodes": {"ab": {"id": "ab", "URI": "/a/b"}}
                    },
                    "b": {"id": "b", "URI": "/b", "groups": ["staff"]}
                }
            },
            "en": {"id": "root", "URI": "/en", "nodes": {"a": {"id": "a", "URI": "/en/a"}}}
        })
    }

    fn env(dimensions: &[&str]) -> Env {
        Env::new(dimensions.iter().copied(), Vec::<String>::new())
    }

    #[tokio::test]
    async fn update_publishes_counts() {
        let repo = repo(StaticSource::new(site()));
        assert!(!repo.is_loaded());

        let response = repo.update().await;
        assert!(response.success, "{}", response.error_message);
        assert_eq!(response.stats.number_of_nodes, 6);
        assert_eq!(response.stats.number_of_uris, 6);
        assert!(repo.is_loaded());
        assert_eq!(repo.phase(), UpdatePhase::Idle);
        assert_eq!(repo.dimension_names(), vec!["de", "en"]);
        repo.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_uri_leaves_state_unchanged() {
        let source = StaticSource::new(site());
        let repo = repo(source.clone());
        assert!(repo.update().await.success);
        let raw = repo.get_repo();
        let before = repo.snapshot();

        source.set(json!({
            "de": {
                "id": "root", "URI": "/",
                "nodes": {"x": {"id": "x", "URI": "/same"}, "y": {"id": "y", "URI": "/same"}}
            }
        }));
        let response = repo.update().await;
        assert!(!response.success);
        assert!(response.error_message.contains("/same"), "{}", response.error_message);

        assert_eq!(repo.get_repo(), raw);
        assert_eq!(repo.snapshot(), before);
        assert_eq!(repo.dimension_names(), vec!["de", "en"]);
        repo.shutdown().await;
    }

    /// Load `site()`, then push `broken` and check nothing moved.
    async fn assert_rejected_without_change(broken: serde_json::Value, expected: &str) {
        let source = StaticSource::new(site());
        let repo = repo(source.clone());
        assert!(repo.update().await.success);
        let raw = repo.get_repo();
        let before = repo.snapshot();

        source.set(broken);
        let response = repo.update().await;
        assert!(!response.success);
        assert!(response.error_message.contains(expected), "{}", response.error_message);

        assert_eq!(repo.get_repo(), raw);
        assert_eq!(repo.snapshot(), before);
        assert_eq!(repo.stats().number_of_nodes, 6);
        repo.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_id_leaves_state_unchanged() {
        // "de" builds fine and is staged before "en" fails.
        assert_rejected_without_change(
            json!({
                "de": {"id": "root", "URI": "/", "nodes": {"new": {"id": "new", "URI": "/new"}}},
                "en": {
                    "id": "root", "URI": "/en",
                    "nodes": {"x": {"id": "x", "URI": "/en/x", "nodes": {"dup": {"id": "x", "URI": "/en/x/y"}}}}
                }
            }),
            "duplicate node id",
        )
        .await;
    }

    #[tokio::test]
    async fn dangling_link_leaves_state_unchanged() {
        assert_rejected_without_change(
            json!({
                "de": {"id": "root", "URI": "/"},
                "en": {"id": "root", "URI": "/en", "nodes": {"x": {"id": "x", "URI": "/en/x", "linkId": "nowhere"}}}
            }),
            "nowhere",
        )
        .await;
    }

    #[tokio::test]
    async fn malformed_snapshot_fails_without_publishing() {
        let source = StaticSource::new(json!(["not", "a", "map"]));
        let repo = repo(source);
        let response = repo.update().await;
        assert!(!response.success);
        assert!(!repo.is_loaded());
        repo.shutdown().await;
    }

    #[tokio::test]
    async fn orphaned_dimensions_are_dropped() {
        let source = StaticSource::new(site());
        let repo = repo(source.clone());
        assert!(repo.update().await.success);

        source.set(json!({"de": {"id": "root", "URI": "/"}}));
        assert!(repo.update().await.success);
        assert_eq!(repo.dimension_names(), vec!["de"]);
        assert!(matches!(
            repo.get_uris("en", &["a".to_string()]),
            Err(RepoError::Validation(_))
        ));
        repo.shutdown().await;
    }

    #[tokio::test]
    async fn concurrent_update_is_rejected() {
        let source = Arc::new(GatedSource {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let repo = Arc::new(repo(source.clone()));

        let first = tokio::spawn({
            let repo = repo.clone();
            async move { repo.try_update().await }
        });
        source.entered.notified().await;
        assert!(repo.is_updating());
        assert_eq!(repo.phase(), UpdatePhase::Fetching);

        assert!(matches!(repo.try_update().await, Err(RepoError::UpdateRejected)));
        let rejected = repo.update().await;
        assert!(!rejected.success);

        source.release.notify_one();
        let response = first.await.unwrap().unwrap();
        assert!(response.success);
        assert!(!repo.is_updating());
        repo.shutdown().await;
    }

    #[tokio::test]
    async fn restores_from_history() {
        let history = history();
        history.add(Bytes::from(site().to_string())).await.unwrap();

        let repo = Repo::with_source(RepoConfig::new("failing"), Arc::new(FailingSource), history);
        let restored = repo.restore().await.unwrap();
        assert!(restored.success);
        assert!(repo.is_loaded());

        let response = repo.update().await;
        assert!(!response.success);
        assert!(response.error_message.contains("upstream down"));
        // Still serving the restored snapshot.
        assert_eq!(repo.stats().number_of_nodes, 6);
        repo.shutdown().await;
    }

    #[tokio::test]
    async fn restore_without_history() {
        let repo = repo(Arc::new(FailingSource));
        let response = repo.restore().await.unwrap();
        assert!(!response.success);
        assert!(!repo.is_loaded());
        repo.shutdown().await;
    }

    #[tokio::test]
    async fn successful_update_is_persisted() {
        let repo = repo(StaticSource::new(site()));
        assert!(repo.update().await.success);
        let current = repo.history().current().await.unwrap().unwrap();
        assert_eq!(current, repo.get_repo());
        repo.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn poll_skips_unchanged_snapshots() {
        let source = StaticSource::new(site());
        let mut config = RepoConfig::new("static");
        config.poll_interval = Some(Duration::from_secs(10));
        let repo = Repo::with_source(config, source.clone(), history());
        assert!(repo.update().await.success);
        let snapshots = repo.history().snapshots().await.unwrap().len();

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(source.fetches.load(Ordering::SeqCst) >= 3);
        assert_eq!(repo.history().snapshots().await.unwrap().len(), snapshots);
        repo.shutdown().await;
    }

    #[tokio::test]
    async fn content_and_nodes() {
        let repo = repo(StaticSource::new(site()));
        assert!(repo.update().await.success);

        let request = ContentRequest::new(env(&["de"]), "/a/b/c")
            .with_node("nav", NodeRequest::new("root"));
        let content = repo.get_content(&request).unwrap();
        assert_eq!(content.status, ContentStatus::Ok);
        assert_eq!(content.item.unwrap().id, "ab");
        assert_eq!(content.nodes["nav"].index, vec!["a".to_string()]);

        let forbidden = repo
            .get_content(&ContentRequest::new(env(&["de"]), "/b"))
            .unwrap();
        assert_eq!(forbidden.status, ContentStatus::Forbidden);

        let mut requests = HashMap::new();
        requests.insert("en".to_string(), NodeRequest::new("a").in_dimension("en"));
        requests.insert("gone".to_string(), NodeRequest::new("a").in_dimension("fr"));
        let nodes = repo.get_nodes(Some(&env(&["de"])), &requests).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes["en"].item.uri, "/en/a");
        assert_eq!(repo.missed_node_lookups(), 1);

        assert!(matches!(repo.get_nodes(None, &requests), Err(RepoError::Validation(_))));
        repo.shutdown().await;
    }

    #[tokio::test]
    async fn whole_repo_round_trip() {
        let tree = SnapshotNode::new("root", "/")
            .with_child(SnapshotNode::new("a", "/a").with_child(SnapshotNode::new("ab", "/a/b")))
            .with_child(SnapshotNode::new("c", "/c"));
        let mut alias = SnapshotNode::new("alias", "/alias");
        alias.link_id = "c".into();
        let tree = tree.with_child(alias);
        let mut snapshot = Snapshot::new();
        snapshot.insert("de".to_string(), tree);

        let source = StaticSource::new(serde_json::to_value(&snapshot).unwrap());
        let repo = repo(source);
        assert!(repo.update().await.success);

        let served: Snapshot = serde_json::from_slice(&repo.get_repo()).unwrap();
        assert_eq!(served, snapshot);
        assert_eq!(repo.snapshot(), snapshot);
        repo.shutdown().await;
    }
}
