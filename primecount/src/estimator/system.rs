//! # Estimator
//!
//! Owns the shards, the load balancer and the solver threads, and wires the
//! reporter to them.
//!
//! ## Lifecycle
//! 1. `new` validates the configuration and restores shards from the
//!    checkpoint, falling back to zeroed shards on any load failure.
//! 2. `start` spawns one solver per shard.
//! 3. `request_stop` / `shutdown` raise the stop flag, which solvers observe
//!    at their next chunk boundary, and join them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{info, warn};

use super::balancer::LoadBalancer;
use super::checkpoint::{self, CheckpointStore};
use super::config::EstimatorConfig;
use super::error::{CheckpointError, EstimatorError, Result};
use super::partition::Partition;
use super::reporter::{Console, Reporter, ReporterHandle};
use super::shard::{ShardSet, Snapshot};
use super::worker::{Solver, SolverExit, SolverHandle};

const FINISH_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where the initial shard values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No checkpoint path was configured.
    Disabled,
    /// The checkpoint was read and applied.
    Restored,
    /// A checkpoint path was configured but could not be used.
    Discarded,
}

/// The concurrent π(N) estimator.
#[derive(Debug)]
pub struct Estimator {
    config: EstimatorConfig,
    shards: ShardSet,
    balancer: Arc<dyn LoadBalancer>,
    store: Option<CheckpointStore>,
    stop: Arc<AtomicBool>,
    solvers: Vec<SolverHandle>,
    restore: RestoreOutcome,
}

impl Estimator {
    /// Validate `config` and restore the shards.
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        config.validate()?;

        let store = config
            .checkpoint_path
            .as_ref()
            .map(|path| CheckpointStore::new(path.clone(), config.workers));
        let (snapshot, restore) = Self::restore(store.as_ref(), config.workers, config.chunk_size);

        let balancer = config.balancing.build();
        if restore == RestoreOutcome::Restored {
            balancer.reconcile(&snapshot);
        }

        Ok(Self {
            shards: ShardSet::from_snapshot(&snapshot),
            balancer,
            store,
            stop: Arc::new(AtomicBool::new(false)),
            solvers: Vec::with_capacity(config.workers),
            restore,
            config,
        })
    }

    /// Restored state is all or nothing: any load or validation failure yields zeroed shards.
    fn restore(store: Option<&CheckpointStore>, workers: usize, chunk_size: u64) -> (Snapshot, RestoreOutcome) {
        let Some(store) = store else {
            warn!("no checkpoint file specified, progress will not be saved");
            return (Snapshot::zeroed(workers), RestoreOutcome::Disabled);
        };

        let path = store.path().display();
        let restored = store
            .load()
            .and_then(|snapshot| checkpoint::verify(&snapshot, chunk_size).map(|()| snapshot));
        match restored {
            Ok(snapshot) => {
                info!(
                    %path,
                    chunks = snapshot.total_chunks(),
                    density = snapshot.total_density(),
                    "loaded progress from checkpoint"
                );
                return (snapshot, RestoreOutcome::Restored);
            }
            Err(CheckpointError::NotFound(_)) => {
                warn!(%path, "could not open checkpoint, starting from zero");
            }
            Err(e) if e.is_corrupted() => {
                warn!(%path, error = %e, "checkpoint is corrupted, starting from zero");
            }
            Err(e) => {
                warn!(%path, error = %e, "failed to read checkpoint, starting from zero");
            }
        }
        (Snapshot::zeroed(workers), RestoreOutcome::Discarded)
    }

    pub fn restore_outcome(&self) -> RestoreOutcome {
        self.restore
    }

    pub fn balancer(&self) -> &Arc<dyn LoadBalancer> {
        &self.balancer
    }

    /// Live view of every shard. Not a consistent global cut.
    pub fn snapshot(&self) -> Snapshot {
        self.shards.snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.solvers.is_empty()
    }

    /// Spawn one solver thread per shard.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(EstimatorError::AlreadyStarted);
        }
        self.stop.store(false, Ordering::Release);

        for worker in 0..self.config.workers {
            let shard = self
                .shards
                .shard(worker)
                .ok_or_else(|| EstimatorError::ThreadSetup(format!("No shard for solver {}", worker)))?;
            let solver = Solver::new(
                Partition::new(worker, self.config.chunk_size, self.config.workers),
                shard,
                Arc::clone(&self.balancer),
                Arc::clone(&self.stop),
                self.config.chunk_limit,
            );
            match SolverHandle::spawn(solver) {
                Ok(handle) => self.solvers.push(handle),
                Err(e) => {
                    self.request_stop();
                    let _ = self.join();
                    return Err(e);
                }
            }
        }

        info!(
            workers = self.config.workers,
            chunk_size = self.config.chunk_size,
            balancing = ?self.config.balancing,
            "estimator started"
        );
        Ok(())
    }

    /// Build a reporter reading this estimator's shards.
    pub fn reporter(&self) -> Reporter {
        Reporter::new(self.shards.clone(), self.config.chunk_size, self.store.clone())
    }

    /// Launch the periodic reporter on `runtime`.
    pub fn spawn_reporter(&self, runtime: &Handle, console: Console) -> ReporterHandle {
        self.reporter().spawn(runtime, self.config.report_interval, console)
    }

    /// Ask every solver to stop at its next chunk boundary. Does not wait.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.balancer.release();
    }

    /// Whether every spawned solver has exited.
    pub fn is_finished(&self) -> bool {
        self.solvers.iter().all(SolverHandle::is_finished)
    }

    /// Wait without blocking the runtime until every solver has exited on its
    /// own (chunk limit). Cancel-safe: the solvers stay owned by `self`.
    pub async fn finished(&self) {
        while !self.is_finished() {
            tokio::time::sleep(FINISH_POLL_INTERVAL).await;
        }
    }

    /// Block until every solver thread has exited.
    ///
    /// All solvers are joined even if one panicked; the first panic is returned.
    pub fn join(&mut self) -> Result<Vec<SolverExit>> {
        join_all(std::mem::take(&mut self.solvers))
    }

    /// Stop every solver and join them within `timeout`.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<Vec<SolverExit>> {
        if !self.is_running() {
            return Err(EstimatorError::NotRunning);
        }
        self.request_stop();

        let solvers = std::mem::take(&mut self.solvers);
        let joined = tokio::task::spawn_blocking(move || join_all(solvers));
        let exits = match tokio::time::timeout(timeout, joined).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(EstimatorError::Other(anyhow::anyhow!("Failed to join solvers: {}", e)));
            }
            Err(_) => return Err(EstimatorError::ShutdownTimeout(timeout)),
        };

        info!(chunks = self.shards.snapshot().total_chunks(), "estimator stopped");
        Ok(exits)
    }
}

impl Drop for Estimator {
    fn drop(&mut self) {
        if self.is_running() {
            self.request_stop();
        }
    }
}

fn join_all(solvers: Vec<SolverHandle>) -> Result<Vec<SolverExit>> {
    let mut exits = Vec::with_capacity(solvers.len());
    let mut first_error = None;
    for handle in solvers {
        match handle.join() {
            Ok(exit) => exits.push(exit),
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(exits),
    }
}
