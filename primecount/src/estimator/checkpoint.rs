//! # Checkpoint Store
//!
//! Binary snapshot of every shard, written on each reporter tick and read once
//! at startup. The layout is two fixed-size arrays in worker order, native
//! endianness:
//!
//! ```text
//! [0, 8W)     chunks completed   (u64 x W)
//! [8W, 16W)   density estimate   (f64 x W)
//! ```
//!
//! A record is accepted only if it is exactly `16W` bytes; anything else is
//! discarded as a whole.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::mem::size_of;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::CheckpointError;
use super::partition::Partition;
use super::shard::Snapshot;

const CHUNKS_WIDTH: usize = size_of::<u64>();
const DENSITY_WIDTH: usize = size_of::<f64>();

/// Size in bytes of a record for `workers` shards.
pub fn record_len(workers: usize) -> usize {
    workers * (CHUNKS_WIDTH + DENSITY_WIDTH)
}

/// Serialize a snapshot in the two-array layout.
pub fn encode(snapshot: &Snapshot) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(record_len(snapshot.workers()));
    for chunks in &snapshot.chunks {
        bytes.extend_from_slice(&chunks.to_ne_bytes());
    }
    for density in &snapshot.density {
        bytes.extend_from_slice(&density.to_ne_bytes());
    }
    bytes
}

/// Parse a record for `workers` shards. Partial records are rejected.
pub fn decode(bytes: &[u8], workers: usize) -> Result<Snapshot, CheckpointError> {
    let expected = record_len(workers);
    if bytes.len() < expected {
        return Err(CheckpointError::Truncated { expected, actual: bytes.len() });
    }
    if bytes.len() > expected {
        return Err(CheckpointError::SizeMismatch { expected, actual: bytes.len() });
    }

    let (chunk_bytes, density_bytes) = bytes.split_at(workers * CHUNKS_WIDTH);
    let chunks = chunk_bytes
        .chunks_exact(CHUNKS_WIDTH)
        .map(|raw| u64::from_ne_bytes(word(raw)))
        .collect();
    let density = density_bytes
        .chunks_exact(DENSITY_WIDTH)
        .map(|raw| f64::from_ne_bytes(word(raw)))
        .collect();
    Ok(Snapshot { chunks, density })
}

/// Check that a decoded record describes a state solvers can resume from
/// with chunk size `chunk_size`.
///
/// Every density must be a finite, non-negative sum, a shard with no
/// completed chunks must have zero density, and neither any solver's next
/// chunk nor the total count of checked integers may overflow a `u64`.
pub fn verify(snapshot: &Snapshot, chunk_size: u64) -> Result<(), CheckpointError> {
    let workers = snapshot.workers();
    let mut total_chunks = 0u64;

    for (worker, (&chunks, &density)) in snapshot.chunks.iter().zip(&snapshot.density).enumerate() {
        let invalid = |reason: &str| CheckpointError::InvalidState {
            worker,
            reason: reason.to_string(),
        };
        if !density.is_finite() || density < 0.0 {
            return Err(invalid("density is not a finite, non-negative number"));
        }
        if chunks == 0 && density != 0.0 {
            return Err(invalid("density recorded without completed chunks"));
        }
        if Partition::new(worker, chunk_size, workers).checked_chunk_end(chunks).is_none() {
            return Err(invalid("next chunk lies beyond the u64 range"));
        }
        total_chunks = total_chunks
            .checked_add(chunks)
            .and_then(|total| total.checked_mul(chunk_size).map(|_| total))
            .ok_or_else(|| invalid("total checked integers overflow"))?;
    }
    Ok(())
}

fn word(raw: &[u8]) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    buf
}

/// Checkpoint file bound to a fixed worker count.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    workers: usize,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            path: path.into(),
            workers,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode the record on disk.
    pub fn load(&self) -> Result<Snapshot, CheckpointError> {
        let bytes = fs::read(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CheckpointError::NotFound(self.path.clone()),
            _ => CheckpointError::Io(e),
        })?;
        let snapshot = decode(&bytes, self.workers)?;
        debug!(path = %self.path.display(), workers = self.workers, "checkpoint loaded");
        Ok(snapshot)
    }

    /// Overwrite the record with `snapshot`.
    ///
    /// The record is written to a sibling file first and renamed into place,
    /// so the previous record stays intact if the write fails midway.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), CheckpointError> {
        if snapshot.workers() != self.workers {
            return Err(CheckpointError::SizeMismatch {
                expected: record_len(self.workers),
                actual: record_len(snapshot.workers()),
            });
        }
        let staging = self.staging_path();
        fs::write(&staging, encode(snapshot))?;
        fs::rename(&staging, &self.path)?;
        debug!(path = %self.path.display(), chunks = snapshot.total_chunks(), "checkpoint saved");
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
