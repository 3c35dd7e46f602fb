// Checkpoint persistence and restore behavior

use std::fs;

use primecount::estimator::checkpoint::{self, CheckpointStore};
use primecount::estimator::{
    BalancingMode, CheckpointError, Estimator, EstimatorConfig, Reporter, RestoreOutcome, ShardSet, Snapshot,
    Watermark,
};
use tempfile::TempDir;

fn sample_snapshot() -> Snapshot {
    Snapshot {
        chunks: vec![12, 7, 31, 0],
        density: vec![1234.567_891_234, 0.1 + 0.2, 98765.4321, 0.0],
    }
}

#[test]
fn test_save_then_load_is_identity() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path().join("state.bin"), 4);

    let snapshot = sample_snapshot();
    store.save(&snapshot).unwrap();
    let loaded = store.load().unwrap();

    assert_eq!(loaded.chunks, snapshot.chunks);
    for (a, b) in loaded.density.iter().zip(&snapshot.density) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn test_save_overwrites_previous_record() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.bin");
    let store = CheckpointStore::new(&path, 4);

    store.save(&Snapshot::zeroed(4)).unwrap();
    store.save(&sample_snapshot()).unwrap();

    assert_eq!(fs::metadata(&path).unwrap().len() as usize, checkpoint::record_len(4));
    assert_eq!(store.load().unwrap(), sample_snapshot());
    assert!(!dir.path().join("state.bin.tmp").exists());
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path().join("absent.bin"), 2);
    assert!(matches!(store.load(), Err(CheckpointError::NotFound(_))));
}

#[test]
fn test_truncated_checkpoint_starts_from_zero() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.bin");

    let full = checkpoint::encode(&sample_snapshot());
    // Keep the whole chunk array but only part of the density array.
    fs::write(&path, &full[..full.len() - 5]).unwrap();

    let store = CheckpointStore::new(&path, 4);
    assert!(matches!(store.load(), Err(CheckpointError::Truncated { .. })));

    let config = EstimatorConfig::default().with_workers(4).with_checkpoint(&path);
    let estimator = Estimator::new(config).unwrap();
    assert_eq!(estimator.restore_outcome(), RestoreOutcome::Discarded);
    assert_eq!(estimator.snapshot(), Snapshot::zeroed(4));
}

#[test]
fn test_right_sized_record_with_garbage_values_starts_from_zero() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.bin");
    CheckpointStore::new(&path, 2)
        .save(&Snapshot {
            chunks: vec![u64::MAX - 1, 3],
            density: vec![f64::NAN, -5.0],
        })
        .unwrap();

    let config = EstimatorConfig::default()
        .with_workers(2)
        .with_chunk_size(100)
        .with_chunk_limit(2)
        .with_checkpoint(&path);
    let mut estimator = Estimator::new(config).unwrap();
    assert_eq!(estimator.restore_outcome(), RestoreOutcome::Discarded);
    assert_eq!(estimator.snapshot(), Snapshot::zeroed(2));

    // Solvers and the reporter run normally from the zeroed state.
    let mut reporter = estimator.reporter();
    estimator.start().unwrap();
    estimator.join().unwrap();
    let report = reporter.capture();
    assert_eq!(report.snapshot.chunks, vec![2, 2]);
    assert_eq!(report.total_checked, 400);
    assert!(report.total_density.is_finite() && report.total_density > 0.0);
}

#[test]
fn test_overflowing_chunk_count_is_corrupted() {
    let snapshot = Snapshot {
        chunks: vec![1, u64::MAX / 3],
        density: vec![0.5, 0.5],
    };
    let err = checkpoint::verify(&snapshot, 4).unwrap_err();
    assert!(err.is_corrupted());
    assert!(matches!(err, CheckpointError::InvalidState { worker: 1, .. }));
}

#[test]
fn test_worker_count_change_discards_checkpoint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.bin");
    CheckpointStore::new(&path, 4).save(&sample_snapshot()).unwrap();

    let estimator = Estimator::new(EstimatorConfig::default().with_workers(2).with_checkpoint(&path)).unwrap();
    assert_eq!(estimator.restore_outcome(), RestoreOutcome::Discarded);
    assert_eq!(estimator.snapshot(), Snapshot::zeroed(2));
}

#[test]
fn test_restore_reconciles_watermark() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.bin");
    CheckpointStore::new(&path, 4).save(&sample_snapshot()).unwrap();

    let config = EstimatorConfig::default()
        .with_workers(4)
        .with_checkpoint(&path)
        .with_balancing(BalancingMode::soft());
    let estimator = Estimator::new(config).unwrap();

    assert_eq!(estimator.restore_outcome(), RestoreOutcome::Restored);
    assert_eq!(estimator.snapshot(), sample_snapshot());
    assert_eq!(estimator.balancer().watermark(), Some(Watermark { min_chunks: 0, owner: 3 }));
}

#[test]
fn test_save_failure_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path().join("missing-dir").join("state.bin"), 2);
    assert!(matches!(store.save(&Snapshot::zeroed(2)), Err(CheckpointError::Io(_))));

    let shards = ShardSet::new(2);
    let mut reporter = Reporter::new(shards.clone(), 10, Some(store));
    shards.shard(0).unwrap().record(1.0);
    let report = reporter.tick();
    assert_eq!(report.total_checked, 10);
    assert!(!reporter.persist(&report.snapshot));
}

#[test]
fn test_reporter_tick_writes_checkpoint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.bin");
    let shards = ShardSet::new(3);
    let mut reporter = Reporter::new(shards.clone(), 100, Some(CheckpointStore::new(&path, 3)));

    shards.shard(2).unwrap().record(4.5);
    let report = reporter.tick();

    let loaded = CheckpointStore::new(&path, 3).load().unwrap();
    assert_eq!(loaded, report.snapshot);
    assert_eq!(loaded.chunks, vec![0, 0, 1]);
}
