use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::balancer::{LoadBalancer, NoopBalancer, SoftBalancer};
use super::error::{EstimatorError, Result};

pub const DEFAULT_CHUNK_SIZE: u64 = 65536;
pub const DEFAULT_SLEEP_THRESHOLD: u64 = 128;
pub const DEFAULT_WAKE_THRESHOLD: u64 = 64;
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

// --- Configuration Enums ---

/// Selects how solvers are kept in step with each other.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BalancingMode {
    /// Solvers never check or wait; each runs as fast as it is scheduled.
    #[default]
    Disabled,
    /// Solvers that drift too far ahead of the slowest one suspend.
    Soft {
        /// Lead (in chunks) over the minimum that makes a solver suspend.
        sleep_threshold: u64,
        /// Lead (in chunks) a suspended solver must fall back to before resuming.
        wake_threshold: u64,
    },
}

impl BalancingMode {
    /// Soft balancing with the default thresholds.
    pub fn soft() -> Self {
        Self::Soft {
            sleep_threshold: DEFAULT_SLEEP_THRESHOLD,
            wake_threshold: DEFAULT_WAKE_THRESHOLD,
        }
    }

    /// Build the load balancer strategy for this mode.
    pub fn build(&self) -> Arc<dyn LoadBalancer> {
        match *self {
            Self::Disabled => Arc::new(NoopBalancer),
            Self::Soft { sleep_threshold, wake_threshold } => {
                Arc::new(SoftBalancer::new(sleep_threshold, wake_threshold))
            }
        }
    }
}

// --- Estimator Configuration ---

/// Configuration for the `Estimator`.
#[derive(Clone, Debug)]
pub struct EstimatorConfig {
    /// Number of solver threads (and shards).
    pub workers: usize,

    /// Number of consecutive integers evaluated per chunk.
    pub chunk_size: u64,

    /// Load balancing strategy.
    pub balancing: BalancingMode,

    /// Time between two reporter ticks.
    pub report_interval: Duration,

    /// Checkpoint file used for both load and save. `None` disables persistence.
    pub checkpoint_path: Option<PathBuf>,

    /// Per-solver stop point, in completed chunks. `None` runs forever.
    pub chunk_limit: Option<u64>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            balancing: BalancingMode::default(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            checkpoint_path: None,
            chunk_limit: None,
        }
    }
}

impl EstimatorConfig {
    /// Check the configuration for values the estimator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(EstimatorError::InvalidConfig("workers must be at least 1".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(EstimatorError::InvalidConfig("chunk_size must be at least 1".to_string()));
        }
        if self.report_interval.is_zero() {
            return Err(EstimatorError::InvalidConfig("report_interval must be non-zero".to_string()));
        }
        if let BalancingMode::Soft { sleep_threshold, wake_threshold } = self.balancing {
            if wake_threshold >= sleep_threshold {
                return Err(EstimatorError::InvalidConfig(format!(
                    "wake_threshold ({}) must be below sleep_threshold ({})",
                    wake_threshold, sleep_threshold
                )));
            }
        }
        Ok(())
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_balancing(mut self, balancing: BalancingMode) -> Self {
        self.balancing = balancing;
        self
    }

    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    pub fn with_chunk_limit(mut self, limit: u64) -> Self {
        self.chunk_limit = Some(limit);
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }
}
