use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Handle;
use tracing::{info, Level};

use primecount::estimator::config::{DEFAULT_CHUNK_SIZE, DEFAULT_SLEEP_THRESHOLD, DEFAULT_WAKE_THRESHOLD};
use primecount::estimator::{BalancingMode, Console, Estimator, EstimatorConfig};
use primecount::logging::{self, LogConfig};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Estimate π(N) forever on every core, resuming from a checkpoint file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Checkpoint file, loaded at startup and rewritten every report
    #[arg(value_name = "FILE")]
    checkpoint: Option<PathBuf>,

    /// Number of solver threads (defaults to the number of CPUs)
    #[arg(short, long, env = "PRIMECOUNT_WORKERS")]
    workers: Option<usize>,

    /// Integers evaluated per chunk
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,

    /// Pause solvers that run too far ahead of the slowest one
    #[arg(short, long)]
    balance: bool,

    /// Lead in chunks that suspends a solver (with --balance)
    #[arg(long, default_value_t = DEFAULT_SLEEP_THRESHOLD)]
    sleep_threshold: u64,

    /// Lead in chunks at which a suspended solver resumes (with --balance)
    #[arg(long, default_value_t = DEFAULT_WAKE_THRESHOLD)]
    wake_threshold: u64,

    /// Milliseconds between progress reports
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Stop each solver after this many completed chunks
    #[arg(long)]
    chunk_limit: Option<u64>,

    /// Minimum log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "PRIMECOUNT_LOG")]
    log_level: Level,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Also append logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn estimator_config(&self) -> EstimatorConfig {
        let mut config = EstimatorConfig::default()
            .with_chunk_size(self.chunk_size)
            .with_report_interval(Duration::from_millis(self.interval_ms));
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if self.balance {
            config = config.with_balancing(BalancingMode::Soft {
                sleep_threshold: self.sleep_threshold,
                wake_threshold: self.wake_threshold,
            });
        }
        if let Some(path) = &self.checkpoint {
            config = config.with_checkpoint(path);
        }
        if let Some(limit) = self.chunk_limit {
            config = config.with_chunk_limit(limit);
        }
        config
    }

    fn init_logging(&self) -> Result<()> {
        let config = LogConfig {
            level: self.log_level,
            json_format: self.json_logs,
            ..Default::default()
        };
        match &self.log_file {
            Some(path) => logging::init_with_file(config, path)
                .with_context(|| format!("failed to open log file {}", path.display())),
            None => {
                logging::init(config);
                Ok(())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging()?;

    let mut estimator = Estimator::new(cli.estimator_config())?;
    estimator.start()?;
    let reporter = estimator.spawn_reporter(&Handle::current(), Console::detect());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("interrupt received, stopping solvers");
        }
        _ = estimator.finished() => {
            info!("every solver reached its chunk limit");
        }
    }

    estimator.shutdown(SHUTDOWN_TIMEOUT).await?;

    // One last tick so the checkpoint holds everything computed before exit.
    let mut reporter = reporter.stop().await?;
    let report = reporter.flush().await;
    Console::plain().draw(&report)?;
    Ok(())
}
