#![doc = " Concurrent π(N) estimator: sharded solver threads, soft load balancing and checkpointing."]

pub mod balancer;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod partition;
pub mod reporter;
pub mod shard;
pub mod system;
pub mod worker;

// Re-export key types for easier usage
pub use balancer::{LoadBalancer, NoopBalancer, SoftBalancer, Verdict, Watermark};
pub use checkpoint::CheckpointStore;
pub use config::{BalancingMode, EstimatorConfig};
pub use error::{CheckpointError, EstimatorError};
pub use partition::{Partition, WorkerId};
pub use reporter::{Console, Report, Reporter, ReporterHandle};
pub use shard::{Shard, ShardSet, ShardState, Snapshot};
pub use system::{Estimator, RestoreOutcome};
pub use worker::{chunk_density, Solver, SolverExit, SolverHandle};
