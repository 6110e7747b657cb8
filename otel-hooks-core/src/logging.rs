//! Logging infrastructure for otel-hooks
//!
//! Logs are written to `<state_dir>/otel-hooks.log.<date>` (default
//! `~/.local/state/otel-hooks/`). Warnings and errors are mirrored to stderr so
//! the host tool can surface them when a hook fails.

use crate::config::Config;
use crate::error::{Error, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Log files are named `<prefix>.<YYYY-MM-DD>` in the state directory
pub const LOG_FILE_PREFIX: &str = "otel-hooks.log";

/// Initialize the logging system
///
/// Sets up tracing with:
/// - File output to the state directory, rotated daily
/// - WARN and above on stderr
/// - Level from RUST_LOG, else `debug` when `config.debug`, else `logging.level`
pub fn init(config: &Config) -> Result<LoggingGuard> {
    let log_dir = config.state_dir();
    let file_appender = file_appender(config)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(&config.logging.level)
        }
    });

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    tracing::debug!(
        log_dir = %log_dir.display(),
        level = %config.logging.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

fn file_appender(config: &Config) -> Result<RollingFileAppender> {
    let log_dir = config.state_dir();
    std::fs::create_dir_all(&log_dir)?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.logging.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Logging(format!("failed to create log appender: {}", e)))
}

/// Initialize logging for tests (logs to stdout)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}
