//! # Reporter
//!
//! Periodically copies every shard, prints the progress table and persists a
//! checkpoint. Each shard lock is held only long enough to copy its pair, so a
//! solver is never blocked for more than one read.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::checkpoint::CheckpointStore;
use super::error::{EstimatorError, Result};
use super::shard::{ShardSet, Snapshot};

const CLEAR_SCREEN: &str = "\x1b[1;1H\x1b[2J";
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Aggregates derived from one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub snapshot: Snapshot,
    /// Integers examined by all solvers: `sum(chunks) * C`.
    pub total_checked: u64,
    /// Sum of every solver's density accumulator.
    pub total_density: f64,
    /// `total_density / total_checked`, or 0 before anything was checked.
    pub prime_frequency: f64,
    /// Integers examined since the previous tick.
    pub checked_delta: u64,
    /// `checked_delta` scaled to one second.
    pub checks_per_second: u64,
}

impl Report {
    fn new(snapshot: Snapshot, chunk_size: u64, previous_checked: u64, elapsed: Duration) -> Self {
        let total_checked = snapshot.total_chunks() * chunk_size;
        let total_density = snapshot.total_density();
        let prime_frequency = if total_checked == 0 {
            0.0
        } else {
            total_density / total_checked as f64
        };
        let checked_delta = total_checked.saturating_sub(previous_checked);
        let checks_per_second = if elapsed.is_zero() {
            checked_delta
        } else {
            (checked_delta as f64 / elapsed.as_secs_f64()).round() as u64
        };
        Self {
            snapshot,
            total_checked,
            total_density,
            prime_frequency,
            checked_delta,
            checks_per_second,
        }
    }

    /// Size of the density estimate read as a count of 8-byte words, in MiB.
    pub fn density_mib(&self) -> f64 {
        self.total_density * 8.0 / BYTES_PER_MIB
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\tSOLVER STATS")?;
        writeln!(f, "worker_id\tchunks_completed\tdensity")?;
        for (id, (chunks, density)) in self.snapshot.chunks.iter().zip(&self.snapshot.density).enumerate() {
            writeln!(f, "{}\t\t{:<12}\t\t{:.2}", id, chunks, density)?;
        }
        writeln!(f)?;
        writeln!(f, "\tTOTAL")?;
        writeln!(f, "prime_count: {:.2} ({:.2} MiB)", self.total_density, self.density_mib())?;
        writeln!(f, "checked_numbers: {} ({:.2e})", self.total_checked, self.total_checked as f64)?;
        writeln!(f, "prime_frequency: {:.6}", self.prime_frequency)?;
        writeln!(f, "checks_per_second: {}", self.checks_per_second)
    }
}

/// Where rendered reports go.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    redraw: bool,
}

impl Console {
    /// Full-screen redraw when stdout is a terminal, plain appends otherwise.
    pub fn detect() -> Self {
        Self {
            redraw: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn plain() -> Self {
        Self { redraw: false }
    }

    pub fn draw(&self, report: &Report) -> io::Result<()> {
        let mut out = io::stdout().lock();
        if self.redraw {
            out.write_all(CLEAR_SCREEN.as_bytes())?;
        }
        write!(out, "{}", report)?;
        out.flush()
    }
}

/// Snapshots shards on a fixed interval and owns the checkpoint store.
#[derive(Debug)]
pub struct Reporter {
    shards: ShardSet,
    chunk_size: u64,
    store: Option<CheckpointStore>,
    last_checked: u64,
    last_tick: Instant,
}

impl Reporter {
    /// The throughput baseline starts at the current totals, so restored
    /// progress is not counted as work done during the first tick.
    pub fn new(shards: ShardSet, chunk_size: u64, store: Option<CheckpointStore>) -> Self {
        let last_checked = shards.snapshot().total_chunks() * chunk_size;
        Self {
            shards,
            chunk_size,
            store,
            last_checked,
            last_tick: Instant::now(),
        }
    }

    /// Copy every shard and derive aggregates. No I/O.
    pub fn capture(&mut self) -> Report {
        let snapshot = self.shards.snapshot();
        let now = Instant::now();
        let report = Report::new(
            snapshot,
            self.chunk_size,
            self.last_checked,
            now.duration_since(self.last_tick),
        );
        self.last_checked = report.total_checked;
        self.last_tick = now;
        report
    }

    /// Write `snapshot` to the checkpoint store, if one is configured.
    ///
    /// Failures are logged and swallowed; the next tick retries.
    pub fn persist(&self, snapshot: &Snapshot) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.save(snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %store.path().display(), error = %e, "failed to save checkpoint");
                false
            }
        }
    }

    /// One full reporting step: capture, then persist.
    pub fn tick(&mut self) -> Report {
        let report = self.capture();
        self.persist(&report.snapshot);
        report
    }

    /// [`tick`](Self::tick) for async callers: the checkpoint is written on
    /// the blocking pool instead of the calling runtime thread.
    pub async fn flush(&mut self) -> Report {
        let report = self.capture();
        self.persist_in_background(report.snapshot.clone()).await;
        report
    }

    /// Run the reporting loop on `runtime` until the returned handle is stopped.
    pub fn spawn(self, runtime: &Handle, interval: Duration, console: Console) -> ReporterHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = runtime.spawn(self.run(interval, console, stop_rx));
        ReporterHandle {
            stop_tx: Some(stop_tx),
            task,
        }
    }

    async fn run(mut self, interval: Duration, console: Console, mut stop_rx: oneshot::Receiver<()>) -> Self {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let report = self.capture();
                    if let Err(e) = console.draw(&report) {
                        debug!(error = %e, "failed to draw report");
                    }
                    self.persist_in_background(report.snapshot).await;
                }
            }
        }
        debug!("reporter stopped");
        self
    }

    async fn persist_in_background(&self, snapshot: Snapshot) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let path = store.path().to_path_buf();
        match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(path = %path.display(), error = %e, "failed to save checkpoint"),
            Err(e) => warn!(path = %path.display(), error = %e, "checkpoint task failed"),
        }
    }
}

/// Handle to a running reporter task.
#[derive(Debug)]
pub struct ReporterHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Reporter>,
}

impl ReporterHandle {
    /// Stop the loop and take the reporter back, e.g. for a final tick.
    pub async fn stop(mut self) -> Result<Reporter> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.task
            .await
            .map_err(|e| EstimatorError::Other(anyhow::anyhow!("Reporter task failed: {}", e)))
    }
}
