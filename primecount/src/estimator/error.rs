use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::partition::WorkerId;

/// Errors related to the estimator lifecycle.
#[derive(Error, Debug)]
pub enum EstimatorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Thread setup error: {0}")]
    ThreadSetup(String),
    #[error("Estimator is already running")]
    AlreadyStarted,
    #[error("Estimator is not running")]
    NotRunning,
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
    #[error("Solver {worker} panicked: {message}")]
    WorkerPanicked { worker: WorkerId, message: String },
    #[error("Internal estimator error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Errors related to loading or saving a checkpoint record.
///
/// None of these are fatal: the caller logs them and either starts from
/// zeroed shards (load) or retries on the next tick (save).
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Could not open {}", .0.display())]
    NotFound(PathBuf),
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Checkpoint is truncated (expected {expected} bytes, found {actual})")]
    Truncated { expected: usize, actual: usize },
    #[error("Checkpoint size mismatch (expected {expected} bytes, found {actual})")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("Checkpoint holds invalid state for solver {worker}: {reason}")]
    InvalidState { worker: WorkerId, reason: String },
}

impl CheckpointError {
    /// Whether the record on disk exists but cannot be trusted.
    pub fn is_corrupted(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::SizeMismatch { .. } | Self::InvalidState { .. }
        )
    }
}

pub type Result<T, E = EstimatorError> = std::result::Result<T, E>;
