//! Tracing subscriber setup.
//!
//! Console output always; a daily-rotated file when a log directory is set.
//! `RUST_LOG` takes precedence over the configured level.

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use warmpool_types::models::LoggingConfig;

const LOG_PREFIX: &str = "warmpool";

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber.
///
/// Returns the file writer guard when file logging is enabled; the caller must
/// keep it alive or buffered lines are lost. Calling this more than once is a
/// no-op returning `None`.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    if INITIALIZED.set(()).is_err() {
        return None;
    }

    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()))
    };

    let console_layer = fmt::layer().compact().with_target(true).with_filter(filter());

    let (file_layer, guard) = match config.directory.as_deref().map(file_writer) {
        Some(Ok((writer, guard))) => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_filter(filter());
            (Some(layer), Some(guard))
        },
        Some(Err(e)) => {
            eprintln!("Warning: file logging disabled: {}", e);
            (None, None)
        },
        None => (None, None),
    };

    let result = tracing_subscriber::registry().with(console_layer).with(file_layer).try_init();
    if let Err(e) = result {
        eprintln!("Warning: tracing subscriber already set: {}", e);
    }

    guard
}

fn file_writer(
    directory: &str,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), String> {
    std::fs::create_dir_all(directory)
        .map_err(|e| format!("cannot create log directory {}: {}", directory, e))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(directory)
        .map_err(|e| format!("cannot create log appender: {}", e))?;

    Ok(tracing_appender::non_blocking(appender))
}
