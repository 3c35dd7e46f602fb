//! # Shards
//!
//! Per-solver shared state. Each shard has exactly one writer (its solver) and
//! one reader (the reporter). The lock exists so the reporter sees the
//! `(density, chunks)` pair as a unit; it never mediates writer contention.
//!
//! No lock ever spans more than one shard. [`ShardSet::snapshot`] visits
//! shards one at a time, so it is not a consistent global cut.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::partition::WorkerId;

/// Contents of one shard.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShardState {
    /// Sum of `1/ln(n)` over every integer this solver has examined.
    pub density: f64,
    /// Number of chunks this solver has finished.
    pub chunks: u64,
}

/// One solver's accumulator and counter behind a single lock.
///
/// Aligned to 128 bytes so neighbouring shards never share a cache line.
#[repr(align(128))]
#[derive(Debug, Default)]
pub struct Shard {
    state: Mutex<ShardState>,
}

impl Shard {
    pub fn new(state: ShardState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    // The state is two plain numbers written together, so a poisoned lock
    // still guards a coherent pair.
    fn lock(&self) -> MutexGuard<'_, ShardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fold one finished chunk into the shard and return the new chunk count.
    pub fn record(&self, partial_density: f64) -> u64 {
        let mut state = self.lock();
        state.density += partial_density;
        state.chunks += 1;
        state.chunks
    }

    /// Copy the pair out under the lock.
    pub fn snapshot(&self) -> ShardState {
        *self.lock()
    }

    pub fn chunks(&self) -> u64 {
        self.lock().chunks
    }
}

/// A point-in-time copy of every shard, in worker order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub chunks: Vec<u64>,
    pub density: Vec<f64>,
}

impl Snapshot {
    /// All-zero snapshot for `workers` shards.
    pub fn zeroed(workers: usize) -> Self {
        Self {
            chunks: vec![0; workers],
            density: vec![0.0; workers],
        }
    }

    pub fn workers(&self) -> usize {
        self.chunks.len()
    }

    pub fn total_chunks(&self) -> u64 {
        self.chunks.iter().sum()
    }

    pub fn total_density(&self) -> f64 {
        self.density.iter().sum()
    }

    /// The slowest solver and its chunk count. Ties go to the lowest id.
    pub fn min_chunks(&self) -> Option<(WorkerId, u64)> {
        self.chunks
            .iter()
            .copied()
            .enumerate()
            .min_by_key(|&(id, chunks)| (chunks, id))
    }

    /// Largest difference in completed chunks between any two solvers.
    pub fn spread(&self) -> u64 {
        match (self.chunks.iter().max(), self.chunks.iter().min()) {
            (Some(max), Some(min)) => max - min,
            _ => 0,
        }
    }
}

/// All shards of one estimator.
#[derive(Debug, Clone)]
pub struct ShardSet {
    shards: Vec<Arc<Shard>>,
}

impl ShardSet {
    pub fn new(workers: usize) -> Self {
        Self::from_snapshot(&Snapshot::zeroed(workers))
    }

    /// Seed the shards from a restored snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let shards = snapshot
            .chunks
            .iter()
            .zip(&snapshot.density)
            .map(|(&chunks, &density)| Arc::new(Shard::new(ShardState { density, chunks })))
            .collect();
        Self { shards }
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Shared handle to one shard, handed to its solver.
    pub fn shard(&self, worker: WorkerId) -> Option<Arc<Shard>> {
        self.shards.get(worker).cloned()
    }

    /// Capture every shard, locking each in turn.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot {
            chunks: Vec::with_capacity(self.shards.len()),
            density: Vec::with_capacity(self.shards.len()),
        };
        for shard in &self.shards {
            let state = shard.snapshot();
            snapshot.chunks.push(state.chunks);
            snapshot.density.push(state.density);
        }
        snapshot
    }
}
