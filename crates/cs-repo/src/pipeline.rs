//! The update pipeline.
//!
//! Two long-running tasks cooperate through channels:
//!
//! - the **coordinator** receives update commands one at a time, fetches and
//!   parses the snapshot, and drives the merge;
//! - the **merge worker** builds dimensions one by one from a serialized
//!   queue, stages them, and publishes the staged set in a single swap once
//!   every dimension of the snapshot has been built.
//!
//! Single-flight is enforced in front of the coordinator by
//! [`UpdateTrigger`]: a request that arrives while another is in flight is
//! rejected immediately instead of being queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use cs_history::History;
use cs_model::{parse_snapshot, Dimension, SnapshotNode, UpdateResponse, UpdateStats};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{RepoError, RepoResult};
use crate::source::Source;
use crate::state::{stats_for, Dimensions, Shared, UpdatePhase};

/// What an update command should do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UpdateKind {
    /// Fetch from upstream and load unconditionally.
    Fetch,
    /// Fetch from upstream; skip loading if the bytes are unchanged.
    Poll,
    /// Replay the current history entry without contacting upstream.
    Restore,
}

pub(crate) struct UpdateCommand {
    kind: UpdateKind,
    reply: oneshot::Sender<UpdateResponse>,
}

// ---------------------------------------------------------------------------
// UpdateTrigger
// ---------------------------------------------------------------------------

/// Front door of the coordinator. Cheap to clone.
#[derive(Clone)]
pub(crate) struct UpdateTrigger {
    commands: mpsc::Sender<UpdateCommand>,
    in_flight: Arc<AtomicBool>,
    shared: Arc<Shared>,
}

impl UpdateTrigger {
    /// Run one update, or fail with `UpdateRejected` if one is in flight.
    pub(crate) async fn request(&self, kind: UpdateKind) -> RepoResult<UpdateResponse> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(?kind, phase = %self.shared.phase(), "update rejected, another one is in flight");
            return Err(RepoError::UpdateRejected);
        }
        self.shared.set_phase(UpdatePhase::Requested);

        let (reply, response) = oneshot::channel();
        // Capacity is one and in-flight is exclusive, so only a closed
        // channel can make this fail.
        if self.commands.try_send(UpdateCommand { kind, reply }).is_err() {
            self.shared.set_phase(UpdatePhase::Idle);
            self.in_flight.store(false, Ordering::Release);
            return Err(RepoError::ShuttingDown);
        }
        response.await.map_err(|_| RepoError::ShuttingDown)
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

pub(crate) struct PipelineTasks {
    pub(crate) trigger: UpdateTrigger,
    pub(crate) coordinator: tokio::task::JoinHandle<()>,
    pub(crate) merger: tokio::task::JoinHandle<()>,
}

pub(crate) fn spawn(
    source: Arc<dyn Source>,
    history: Arc<History>,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
) -> PipelineTasks {
    let (commands, command_rx) = mpsc::channel(1);
    let (merges, merge_rx) = mpsc::channel(1);
    let in_flight = Arc::new(AtomicBool::new(false));

    let worker = MergeWorker {
        shared: shared.clone(),
        staged: Dimensions::new(),
    };
    let merger = tokio::spawn(worker.run(merge_rx, shutdown.clone()));

    let coordinator = Coordinator {
        source,
        history,
        shared: shared.clone(),
        merges,
        in_flight: in_flight.clone(),
    };
    let coordinator = tokio::spawn(coordinator.run(command_rx, shutdown));

    PipelineTasks {
        trigger: UpdateTrigger {
            commands,
            in_flight,
            shared,
        },
        coordinator,
        merger,
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct Coordinator {
    source: Arc<dyn Source>,
    history: Arc<History>,
    shared: Arc<Shared>,
    merges: mpsc::Sender<MergeJob>,
    in_flight: Arc<AtomicBool>,
}

impl Coordinator {
    async fn run(
        self,
        mut commands: mpsc::Receiver<UpdateCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    let response = self.execute(command.kind).await;
                    self.shared.set_phase(UpdatePhase::Idle);
                    self.in_flight.store(false, Ordering::Release);
                    // The caller may have gone away; the outcome is logged either way.
                    let _ = command.reply.send(response);
                }
            }
        }
        debug!("update coordinator stopped");
    }

    async fn execute(&self, kind: UpdateKind) -> UpdateResponse {
        let id = Uuid::now_v7();
        let started = Instant::now();
        match kind {
            UpdateKind::Restore => match self.restore().await {
                Ok(Some(stats)) => {
                    info!(%id, nodes = stats.number_of_nodes, "restored repository from history");
                    UpdateResponse::succeeded(self.with_runtime(stats, started, 0.0))
                }
                Ok(None) => UpdateResponse::failed("no snapshot in history", self.shared.stats()),
                Err(e) => {
                    warn!(%id, error = %e, "restore from history failed");
                    UpdateResponse::failed(e.to_string(), self.shared.stats())
                }
            },
            UpdateKind::Fetch | UpdateKind::Poll => self.update(id, kind, started).await,
        }
    }

    async fn update(&self, id: Uuid, kind: UpdateKind, started: Instant) -> UpdateResponse {
        info!(%id, ?kind, source = self.source.locator(), "update started");
        self.shared.set_phase(UpdatePhase::Fetching);
        let fetched = self.source.fetch().await;
        let repo_runtime = started.elapsed().as_secs_f64();

        let outcome = match fetched {
            Ok(raw) if kind == UpdateKind::Poll && self.shared.is_loaded() && raw == self.shared.raw() => {
                debug!(%id, "snapshot unchanged, nothing to load");
                let stats = self.with_runtime(self.shared.stats(), started, repo_runtime);
                return UpdateResponse::succeeded(stats);
            }
            Ok(raw) => self.load(raw.clone()).await.map(|stats| (stats, raw)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((stats, raw)) => {
                if let Err(e) = self.history.add(raw).await {
                    warn!(%id, error = %e, "failed to persist snapshot to history");
                }
                let stats = self.with_runtime(stats, started, repo_runtime);
                info!(
                    %id,
                    nodes = stats.number_of_nodes,
                    uris = stats.number_of_uris,
                    runtime = stats.own_runtime,
                    "update succeeded"
                );
                UpdateResponse::succeeded(stats)
            }
            Err(e) => {
                error!(%id, error = %e, "update failed");
                self.restore_after_failure(id).await;
                let stats = self.with_runtime(self.shared.stats(), started, repo_runtime);
                UpdateResponse::failed(e.to_string(), stats)
            }
        }
    }

    /// Parse and merge raw snapshot bytes, publishing on success.
    async fn load(&self, raw: Bytes) -> RepoResult<UpdateStats> {
        self.shared.set_phase(UpdatePhase::Parsing);
        let snapshot = parse_snapshot(&raw)?;

        self.shared.set_phase(UpdatePhase::Merging);
        for (dimension, root) in snapshot {
            let (reply, built) = oneshot::channel();
            self.merges
                .send(MergeJob::Stage {
                    dimension,
                    root,
                    reply,
                })
                .await
                .map_err(|_| RepoError::ShuttingDown)?;
            built.await.map_err(|_| RepoError::ShuttingDown)??;
        }

        self.shared.set_phase(UpdatePhase::Publishing);
        let (reply, published) = oneshot::channel();
        self.merges
            .send(MergeJob::Commit { raw, reply })
            .await
            .map_err(|_| RepoError::ShuttingDown)?;
        published.await.map_err(|_| RepoError::ShuttingDown)
    }

    async fn restore(&self) -> RepoResult<Option<UpdateStats>> {
        let Some(raw) = self.history.current().await? else {
            return Ok(None);
        };
        self.load(raw).await.map(Some)
    }

    async fn restore_after_failure(&self, id: Uuid) {
        match self.restore().await {
            Ok(Some(_)) => info!(%id, "restored last known good snapshot"),
            Ok(None) => warn!(%id, "no snapshot in history to restore"),
            Err(e) => error!(%id, error = %e, "restore after failed update failed"),
        }
    }

    fn with_runtime(&self, mut stats: UpdateStats, started: Instant, repo_runtime: f64) -> UpdateStats {
        stats.repo_runtime = repo_runtime;
        stats.own_runtime = started.elapsed().as_secs_f64();
        stats
    }
}

// ---------------------------------------------------------------------------
// MergeWorker
// ---------------------------------------------------------------------------

enum MergeJob {
    /// Build one dimension and stage it.
    Stage {
        dimension: String,
        root: SnapshotNode,
        reply: oneshot::Sender<RepoResult<()>>,
    },
    /// Publish every staged dimension; dimensions not staged are dropped.
    Commit {
        raw: Bytes,
        reply: oneshot::Sender<UpdateStats>,
    },
}

struct MergeWorker {
    shared: Arc<Shared>,
    staged: Dimensions,
}

impl MergeWorker {
    async fn run(mut self, mut jobs: mpsc::Receiver<MergeJob>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                job = jobs.recv() => {
                    let Some(job) = job else { break };
                    self.handle(job);
                }
            }
        }
        debug!("merge worker stopped");
    }

    fn handle(&mut self, job: MergeJob) {
        match job {
            MergeJob::Stage {
                dimension,
                root,
                reply,
            } => {
                let result = match Dimension::build(dimension.as_str(), &root) {
                    Ok(built) => {
                        debug!(%dimension, nodes = built.len(), "dimension staged");
                        self.staged.insert(dimension, built);
                        Ok(())
                    }
                    Err(e) => {
                        warn!(%dimension, error = %e, "dimension rejected, discarding staged update");
                        self.staged.clear();
                        Err(e.into())
                    }
                };
                let _ = reply.send(result);
            }
            MergeJob::Commit { raw, reply } => {
                let dimensions = std::mem::take(&mut self.staged);
                let stats = stats_for(&dimensions);
                let names: Vec<&String> = dimensions.keys().collect();
                debug!(dimensions = ?names, "publishing");
                self.shared.publish(dimensions, raw);
                let _ = reply.send(stats);
            }
        }
    }
}
