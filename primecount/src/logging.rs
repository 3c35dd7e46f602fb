// Logging for the estimator
//
// Built on the `tracing` ecosystem. Log events go to stderr so that the
// reporter's progress table on stdout can redraw the screen without being
// interleaved with log lines.
//
// # Usage Examples
//
// ```rust
// use primecount::logging;
//
// // INFO level, human-readable
// logging::init_default();
//
// // Or with custom settings
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: false,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// Per-solver events can be grouped with the span macro:
//
// ```rust
// let span = primecount::solver_span!(3);
// let _guard = span.enter();
// tracing::debug!("solver suspended");
// ```

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Mutex, Once};
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, registry::Registry, EnvFilter, Layer};

/// Configuration for the logging system
///
/// # Examples
///
/// ```rust
/// use primecount::logging::LogConfig;
/// use tracing::Level;
///
/// let custom_config = LogConfig {
///     level: Level::DEBUG,
///     json_format: true,
///     show_file_line: false,
///     show_thread_info: true,
///     show_time: true,
///     target_filters: Some("primecount::estimator::worker=trace".to_string()),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id (solver threads are named `solver-{id}`)
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: false,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    // Add any target-specific filters if provided
    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            if let Ok(directive) = filter.trim().parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }
    env_filter
}

fn console_layer(config: &LogConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    if config.json_format {
        return fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(io::stderr)
            .with_thread_names(config.show_thread_info)
            .boxed();
    }

    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info);

    if config.show_time {
        layer.boxed()
    } else {
        layer.without_time().boxed()
    }
}

/// Initialize the logging system with the given configuration
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::registry()
            .with(console_layer(&config))
            .with(env_filter(&config));
        set_global_subscriber(subscriber);
    });
}

// Helper function to set the global subscriber
fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Open a log file in append mode, creating it if it doesn't exist
pub fn file_writer(path: impl AsRef<Path>) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize logging with both console and file output
///
/// The file is opened before anything is installed, so a bad path is
/// reported to the caller instead of silently dropping file output.
/// File output is always plain text with file/line and thread info.
pub fn init_with_file(config: LogConfig, log_file: impl AsRef<Path>) -> io::Result<()> {
    let file = file_writer(log_file)?;

    INIT.call_once(|| {
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(console_layer(&config))
            .with(file_layer)
            .with(env_filter(&config));
        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// INFO level with human-readable output.
pub fn init_default() {
    init(LogConfig::default());
}

/// Initialize logging for testing
///
/// Only warnings and errors, no thread info or timestamps.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Create a span for everything one solver logs
///
/// # Examples
///
/// ```rust
/// use primecount::solver_span;
///
/// let span = solver_span!(0);
/// let _guard = span.enter();
///
/// // With additional fields
/// let span = solver_span!(1, chunk_size = 65536);
/// ```
#[macro_export]
macro_rules! solver_span {
    ($worker:expr) => {
        tracing::info_span!("solver", worker = $worker)
    };
    ($worker:expr, $($fields:tt)*) => {
        tracing::info_span!("solver", worker = $worker, $($fields)*)
    };
}
