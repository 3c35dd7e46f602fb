//! # Partition Assigner
//!
//! Maps a solver identity to the integers it evaluates. Solver `i` owns every
//! chunk whose index is congruent to `i` modulo the worker count, so the
//! slices are disjoint, gap-free and need no coordination at runtime.
//!
//! ```text
//! W = 3, C = 4
//! solver 0: [2..6)   [14..18)  [26..30) ...
//! solver 1: [6..10)  [18..22)  [30..34) ...
//! solver 2: [10..14) [22..26)  [34..38) ...
//! ```

/// Identity of a solver, `0..W`.
pub type WorkerId = usize;

/// First integer examined by the estimator.
pub const FIRST_CANDIDATE: u64 = 2;

/// The strided slice of integers owned by one solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    worker: WorkerId,
    chunk_size: u64,
    workers: u64,
}

impl Partition {
    pub fn new(worker: WorkerId, chunk_size: u64, workers: usize) -> Self {
        debug_assert!(worker < workers, "worker {} out of range 0..{}", worker, workers);
        Self {
            worker,
            chunk_size,
            workers: workers as u64,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// First candidate of this solver: `2 + i*C`.
    pub fn first(&self) -> u64 {
        FIRST_CANDIDATE + self.worker as u64 * self.chunk_size
    }

    /// Distance between the starts of two consecutive chunks: `W*C`.
    pub fn stride(&self) -> u64 {
        self.workers * self.chunk_size
    }

    /// Start of this solver's `k`-th chunk (0-based).
    pub fn chunk_start(&self, k: u64) -> u64 {
        self.first() + k * self.stride()
    }

    /// One past the last integer of chunk `k`, or `None` if it does not fit in a `u64`.
    pub fn checked_chunk_end(&self, k: u64) -> Option<u64> {
        k.checked_mul(self.stride())?
            .checked_add(self.first())?
            .checked_add(self.chunk_size)
    }

    /// Lazily walk the chunk starts, beginning at chunk `from`.
    pub fn chunks(&self, from: u64) -> impl Iterator<Item = u64> + '_ {
        (from..).map(move |k| self.chunk_start(k))
    }

    /// The `(worker, chunk_index)` pair that covers `n`, for `n >= 2`.
    pub fn owner_of(n: u64, chunk_size: u64, workers: usize) -> Option<(WorkerId, u64)> {
        if n < FIRST_CANDIDATE || chunk_size == 0 || workers == 0 {
            return None;
        }
        let global_chunk = (n - FIRST_CANDIDATE) / chunk_size;
        let workers = workers as u64;
        Some(((global_chunk % workers) as WorkerId, global_chunk / workers))
    }
}
