// Integration tests for error types in primecount::estimator::error

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use primecount::estimator::error::*;

#[test]
fn test_estimator_error_display() {
    assert_eq!(EstimatorError::InvalidConfig("workers must be at least 1".to_string()).to_string(), "Invalid configuration: workers must be at least 1");
    assert_eq!(EstimatorError::ThreadSetup("no threads".to_string()).to_string(), "Thread setup error: no threads");
    assert_eq!(EstimatorError::AlreadyStarted.to_string(), "Estimator is already running");
    assert_eq!(EstimatorError::NotRunning.to_string(), "Estimator is not running");
    assert_eq!(EstimatorError::ShutdownTimeout(Duration::from_secs(10)).to_string(), "Shutdown timed out after 10s");
    assert_eq!(
        EstimatorError::WorkerPanicked { worker: 3, message: "boom".to_string() }.to_string(),
        "Solver 3 panicked: boom"
    );
    let other_err = EstimatorError::Other(anyhow!("some internal issue"));
    assert!(other_err.to_string().contains("some internal issue"));
}

#[test]
fn test_checkpoint_error_display() {
    assert_eq!(CheckpointError::NotFound(PathBuf::from("state.bin")).to_string(), "Could not open state.bin");
    assert_eq!(
        CheckpointError::Truncated { expected: 256, actual: 100 }.to_string(),
        "Checkpoint is truncated (expected 256 bytes, found 100)"
    );
    assert_eq!(
        CheckpointError::SizeMismatch { expected: 256, actual: 512 }.to_string(),
        "Checkpoint size mismatch (expected 256 bytes, found 512)"
    );
    assert_eq!(
        CheckpointError::InvalidState { worker: 2, reason: "density is negative".to_string() }.to_string(),
        "Checkpoint holds invalid state for solver 2: density is negative"
    );
    let io_err = CheckpointError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
    assert!(io_err.to_string().starts_with("Checkpoint I/O error:"));
}

#[test]
fn test_checkpoint_error_corruption_classification() {
    assert!(CheckpointError::Truncated { expected: 16, actual: 0 }.is_corrupted());
    assert!(CheckpointError::SizeMismatch { expected: 16, actual: 32 }.is_corrupted());
    assert!(CheckpointError::InvalidState { worker: 0, reason: "nan".to_string() }.is_corrupted());
    assert!(!CheckpointError::NotFound(PathBuf::from("missing")).is_corrupted());
    assert!(!CheckpointError::Io(io::Error::other("disk")).is_corrupted());
}
