//! # Solver Module
//!
//! A solver runs on its own OS thread for the lifetime of the estimator. It
//! evaluates one chunk of its partition at a time, folds the result into its
//! shard and checks in with the load balancer.
//!
//! ## Key Concepts
//! - Chunk boundaries: the only points where a solver observes the stop flag
//!   or suspends
//! - Ordering: a solver's own updates are strictly sequential
//! - Panic capture: a panicking solver is reported through its handle rather
//!   than tearing down the process

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, error, info};

use super::balancer::{LoadBalancer, Verdict};
use super::error::{EstimatorError, Result};
use super::partition::{Partition, WorkerId};
use super::shard::Shard;

/// Sum of `1/ln(n)` for `n` in `start..start + len`.
///
/// Every term is positive for `n >= 2`, so the result never lowers an
/// accumulator it is added to.
pub fn chunk_density(start: u64, len: u64) -> f64 {
    (start..start + len).map(|n| (n as f64).ln().recip()).sum()
}

/// Why a solver's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverExit {
    /// The shared stop flag was raised.
    Stopped,
    /// The configured chunk limit was reached.
    LimitReached,
}

/// One solver: a partition cursor bound to its shard.
pub struct Solver {
    partition: Partition,
    shard: Arc<Shard>,
    balancer: Arc<dyn LoadBalancer>,
    stop: Arc<AtomicBool>,
    chunk_limit: Option<u64>,
}

impl fmt::Debug for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solver")
            .field("worker", &self.partition.worker())
            .field("chunks", &self.shard.chunks())
            .field("chunk_limit", &self.chunk_limit)
            .finish()
    }
}

impl Solver {
    pub fn new(
        partition: Partition,
        shard: Arc<Shard>,
        balancer: Arc<dyn LoadBalancer>,
        stop: Arc<AtomicBool>,
        chunk_limit: Option<u64>,
    ) -> Self {
        Self {
            partition,
            shard,
            balancer,
            stop,
            chunk_limit,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.partition.worker()
    }

    fn limit_reached(&self, chunks: u64) -> bool {
        self.chunk_limit.is_some_and(|limit| chunks >= limit)
    }

    /// Main solver loop. Returns only on stop or when the chunk limit is hit.
    pub fn run(&self) -> SolverExit {
        let worker = self.worker();
        let chunk_size = self.partition.chunk_size();
        let stride = self.partition.stride();

        // Restored shards resume after their last completed chunk.
        let mut chunks = self.shard.chunks();
        let mut cursor = self.partition.chunk_start(chunks);
        let mut suspended = false;

        loop {
            if self.stop.load(Ordering::Acquire) {
                return SolverExit::Stopped;
            }
            if self.limit_reached(chunks) {
                return SolverExit::LimitReached;
            }

            if suspended {
                debug!(worker, chunks, "solver suspended");
                if !self.balancer.wait_to_resume(chunks, &self.stop) {
                    return SolverExit::Stopped;
                }
                debug!(worker, chunks, "solver resumed");
                suspended = false;
                continue;
            }

            let partial = chunk_density(cursor, chunk_size);
            chunks = self.shard.record(partial);
            suspended = self.balancer.chunk_completed(worker, chunks) == Verdict::Suspend;
            cursor += stride;
        }
    }
}

/// A solver running on a dedicated, named thread.
pub struct SolverHandle {
    worker: WorkerId,
    thread: JoinHandle<std::result::Result<SolverExit, String>>,
}

impl fmt::Debug for SolverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverHandle")
            .field("worker", &self.worker)
            .field("finished", &self.thread.is_finished())
            .finish()
    }
}

impl SolverHandle {
    /// Spawn `solver` on a thread named `solver-{id}`.
    pub fn spawn(solver: Solver) -> Result<Self> {
        let worker = solver.worker();
        let thread = std::thread::Builder::new()
            .name(format!("solver-{}", worker))
            .spawn(move || Self::thread_main(solver))
            .map_err(|e| {
                EstimatorError::ThreadSetup(format!("Failed to spawn solver {}: {}", worker, e))
            })?;
        Ok(Self { worker, thread })
    }

    fn thread_main(solver: Solver) -> std::result::Result<SolverExit, String> {
        let span = crate::solver_span!(solver.worker());
        let _guard = span.enter();
        info!(chunks = solver.shard.chunks(), "solver started");

        match panic::catch_unwind(AssertUnwindSafe(|| solver.run())) {
            Ok(exit) => {
                info!(chunks = solver.shard.chunks(), ?exit, "solver stopped");
                Ok(exit)
            }
            Err(payload) => {
                let message = panic_message(payload);
                error!(%message, "solver panicked");
                Err(message)
            }
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the solver thread exits.
    pub fn join(self) -> Result<SolverExit> {
        let worker = self.worker;
        match self.thread.join() {
            Ok(Ok(exit)) => Ok(exit),
            Ok(Err(message)) => Err(EstimatorError::WorkerPanicked { worker, message }),
            Err(payload) => Err(EstimatorError::WorkerPanicked {
                worker,
                message: panic_message(payload),
            }),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::balancer::NoopBalancer;

    fn solver(worker: WorkerId, workers: usize, shard: Arc<Shard>, limit: u64) -> Solver {
        Solver::new(
            Partition::new(worker, 10, workers),
            shard,
            Arc::new(NoopBalancer),
            Arc::new(AtomicBool::new(false)),
            Some(limit),
        )
    }

    #[test]
    fn chunk_density_matches_direct_sum() {
        let expected = 1.0 / 2f64.ln() + 1.0 / 3f64.ln() + 1.0 / 4f64.ln();
        assert!((chunk_density(2, 3) - expected).abs() < 1e-12);
        assert_eq!(chunk_density(100, 0), 0.0);
    }

    #[test]
    fn runs_until_limit() {
        let shard = Arc::new(Shard::default());
        let exit = solver(1, 3, Arc::clone(&shard), 4).run();
        assert_eq!(exit, SolverExit::LimitReached);

        let state = shard.snapshot();
        assert_eq!(state.chunks, 4);
        let expected: f64 = (0..4).map(|k| chunk_density(12 + k * 30, 10)).sum();
        assert!((state.density - expected).abs() < 1e-9);
    }

    #[test]
    fn resumes_after_restored_chunks() {
        let restored = Arc::new(Shard::default());
        restored.record(chunk_density(2, 10));
        restored.record(chunk_density(22, 10));
        solver(0, 2, Arc::clone(&restored), 4).run();

        let fresh = Arc::new(Shard::default());
        solver(0, 2, Arc::clone(&fresh), 4).run();

        assert_eq!(restored.chunks(), fresh.chunks());
        assert!((restored.snapshot().density - fresh.snapshot().density).abs() < 1e-9);
    }

    #[test]
    fn stop_flag_ends_loop() {
        let stop = Arc::new(AtomicBool::new(true));
        let solver = Solver::new(
            Partition::new(0, 10, 1),
            Arc::new(Shard::default()),
            Arc::new(NoopBalancer),
            stop,
            None,
        );
        assert_eq!(solver.run(), SolverExit::Stopped);
    }

    #[test]
    fn handle_joins_thread() {
        let shard = Arc::new(Shard::default());
        let handle = SolverHandle::spawn(solver(0, 1, Arc::clone(&shard), 3)).unwrap();
        assert_eq!(handle.worker(), 0);
        assert_eq!(handle.join().unwrap(), SolverExit::LimitReached);
        assert_eq!(shard.chunks(), 3);
    }
}
