//! # Load Balancing
//!
//! Keeps solvers roughly in step. The shared state is a single watermark (the
//! lowest chunk count seen and the solver holding it) guarded by one lock,
//! plus a condition variable used to wake suspended solvers.
//!
//! ## Protocol
//! After recording a chunk, a solver reports its new count:
//! 1. The watermark owner moves the watermark to its new count and wakes everyone.
//! 2. A solver below the watermark takes ownership and wakes everyone.
//! 3. A solver more than `sleep_threshold` chunks ahead suspends before its next chunk.
//!
//! A suspended solver resumes once its lead has fallen to `wake_threshold`.
//! The gap between the two thresholds prevents flapping.
//!
//! The watermark may briefly lag the true minimum; the owner is always a
//! running solver, so it keeps advancing and suspended solvers always wake.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use super::partition::WorkerId;
use super::shard::Snapshot;

/// What a solver should do after reporting a finished chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Start the next chunk right away.
    Continue,
    /// Wait in [`LoadBalancer::wait_to_resume`] before the next chunk.
    Suspend,
}

/// The lowest chunk count observed and the solver believed to hold it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    pub min_chunks: u64,
    pub owner: WorkerId,
}

/// Strategy deciding when solvers pause for each other.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    /// Recompute the watermark from restored chunk counts. Startup only.
    fn reconcile(&self, restored: &Snapshot);

    /// Report that `worker` has just reached `chunks` completed chunks.
    fn chunk_completed(&self, worker: WorkerId, chunks: u64) -> Verdict;

    /// Whether a suspended solver at `chunks` may run again now.
    fn may_resume(&self, chunks: u64) -> bool;

    /// Block until a solver at `chunks` may resume or `stop` is raised.
    ///
    /// Returns `false` when the wait ended because of `stop`.
    fn wait_to_resume(&self, chunks: u64, stop: &AtomicBool) -> bool;

    /// Wake every waiter so it can observe a raised stop flag.
    fn release(&self);

    /// Current watermark, if this strategy tracks one.
    fn watermark(&self) -> Option<Watermark>;
}

/// Balancing disabled: solvers never check in and never wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBalancer;

impl LoadBalancer for NoopBalancer {
    fn reconcile(&self, _restored: &Snapshot) {}

    fn chunk_completed(&self, _worker: WorkerId, _chunks: u64) -> Verdict {
        Verdict::Continue
    }

    fn may_resume(&self, _chunks: u64) -> bool {
        true
    }

    fn wait_to_resume(&self, _chunks: u64, stop: &AtomicBool) -> bool {
        !stop.load(Ordering::Acquire)
    }

    fn release(&self) {}

    fn watermark(&self) -> Option<Watermark> {
        None
    }
}

/// Suspend solvers that drift ahead of the slowest one, with hysteresis.
pub struct SoftBalancer {
    state: Mutex<Watermark>,
    advanced: Condvar,
    sleep_threshold: u64,
    wake_threshold: u64,
}

impl fmt::Debug for SoftBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftBalancer")
            .field("watermark", &*self.lock())
            .field("sleep_threshold", &self.sleep_threshold)
            .field("wake_threshold", &self.wake_threshold)
            .finish()
    }
}

impl SoftBalancer {
    pub fn new(sleep_threshold: u64, wake_threshold: u64) -> Self {
        debug_assert!(wake_threshold < sleep_threshold);
        Self {
            state: Mutex::new(Watermark::default()),
            advanced: Condvar::new(),
            sleep_threshold,
            wake_threshold,
        }
    }

    // The watermark is advisory, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Watermark> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn caught_up(&self, chunks: u64, watermark: &Watermark) -> bool {
        chunks.saturating_sub(watermark.min_chunks) <= self.wake_threshold
    }
}

impl LoadBalancer for SoftBalancer {
    fn reconcile(&self, restored: &Snapshot) {
        let mut watermark = self.lock();
        *watermark = restored
            .min_chunks()
            .map(|(owner, min_chunks)| Watermark { min_chunks, owner })
            .unwrap_or_default();
        self.advanced.notify_all();
    }

    fn chunk_completed(&self, worker: WorkerId, chunks: u64) -> Verdict {
        let mut watermark = self.lock();
        if watermark.owner == worker {
            watermark.min_chunks = chunks;
            self.advanced.notify_all();
            Verdict::Continue
        } else if chunks < watermark.min_chunks {
            *watermark = Watermark { min_chunks: chunks, owner: worker };
            self.advanced.notify_all();
            Verdict::Continue
        } else if chunks - watermark.min_chunks > self.sleep_threshold {
            Verdict::Suspend
        } else {
            Verdict::Continue
        }
    }

    fn may_resume(&self, chunks: u64) -> bool {
        self.caught_up(chunks, &self.lock())
    }

    fn wait_to_resume(&self, chunks: u64, stop: &AtomicBool) -> bool {
        let guard = self.lock();
        let _guard = self
            .advanced
            .wait_while(guard, |watermark| {
                !stop.load(Ordering::Acquire) && !self.caught_up(chunks, watermark)
            })
            .unwrap_or_else(PoisonError::into_inner);
        !stop.load(Ordering::Acquire)
    }

    fn release(&self) {
        // Taking the lock orders the caller's stop store before any waiter's
        // predicate check, so no waiter can miss it.
        let _guard = self.lock();
        self.advanced.notify_all();
    }

    fn watermark(&self) -> Option<Watermark> {
        Some(*self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn restored(chunks: &[u64]) -> Snapshot {
        Snapshot {
            chunks: chunks.to_vec(),
            density: vec![0.0; chunks.len()],
        }
    }

    #[test]
    fn noop_never_suspends() {
        let balancer = NoopBalancer;
        assert_eq!(balancer.chunk_completed(3, 1_000_000), Verdict::Continue);
        assert!(balancer.may_resume(u64::MAX));
        assert_eq!(balancer.watermark(), None);
    }

    #[test]
    fn owner_advances_watermark() {
        let balancer = SoftBalancer::new(4, 2);
        assert_eq!(balancer.chunk_completed(0, 1), Verdict::Continue);
        assert_eq!(balancer.watermark(), Some(Watermark { min_chunks: 1, owner: 0 }));
    }

    #[test]
    fn lower_count_takes_ownership() {
        let balancer = SoftBalancer::new(4, 2);
        balancer.reconcile(&restored(&[10, 12]));
        assert_eq!(balancer.chunk_completed(1, 7), Verdict::Continue);
        assert_eq!(balancer.watermark(), Some(Watermark { min_chunks: 7, owner: 1 }));
    }

    #[test]
    fn suspends_only_past_sleep_threshold() {
        let balancer = SoftBalancer::new(4, 2);
        assert_eq!(balancer.chunk_completed(1, 4), Verdict::Continue);
        assert_eq!(balancer.chunk_completed(1, 5), Verdict::Suspend);
        assert!(!balancer.may_resume(5));
        assert!(balancer.may_resume(2));
    }

    #[test]
    fn reconcile_picks_lowest_id_on_tie() {
        let balancer = SoftBalancer::new(4, 2);
        balancer.reconcile(&restored(&[9, 3, 3]));
        assert_eq!(balancer.watermark(), Some(Watermark { min_chunks: 3, owner: 1 }));
    }

    #[test]
    fn waiter_wakes_when_owner_catches_up() {
        let balancer = Arc::new(SoftBalancer::new(4, 2));
        balancer.reconcile(&restored(&[0, 10]));
        let stop = Arc::new(AtomicBool::new(false));

        let waiter = {
            let balancer = Arc::clone(&balancer);
            let stop = Arc::clone(&stop);
            thread::spawn(move || balancer.wait_to_resume(10, &stop))
        };

        for chunks in 1..=8 {
            balancer.chunk_completed(0, chunks);
            thread::sleep(Duration::from_millis(1));
        }
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn release_unblocks_waiter_on_stop() {
        let balancer = Arc::new(SoftBalancer::new(4, 2));
        balancer.reconcile(&restored(&[0, 100]));
        let stop = Arc::new(AtomicBool::new(false));

        let waiter = {
            let balancer = Arc::clone(&balancer);
            let stop = Arc::clone(&stop);
            thread::spawn(move || balancer.wait_to_resume(100, &stop))
        };

        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Release);
        balancer.release();
        assert!(!waiter.join().unwrap());
    }
}
