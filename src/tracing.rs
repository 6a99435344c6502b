//! Logging setup
//!
//! The console shows `warn` and above unless `RUST_LOG` says otherwise, e.g.
//! `RUST_LOG=vtl_preview::render=debug` or `RUST_LOG=message=debug` for every
//! message entering the update loop. A debug-level copy goes to
//! `logs/vtl-preview.log.YYYY-MM-DD` under the config directory.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config_paths::{logs_dir, LOG_FILE_PREFIX};

/// Install the console and file layers.
///
/// Keep the returned guard alive until exit; dropping it flushes the log
/// file. `None` when the logs directory could not be created, in which case
/// only the console layer is installed.
pub fn init() -> Option<WorkerGuard> {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        );

    let (file_layer, guard) = match file_writer() {
        Some((writer, guard)) => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_line_number(true)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
    guard
}

fn file_writer() -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = logs_dir()?;
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Warning: could not create {}: {}", dir.display(), e);
        return None;
    }
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Some(tracing_appender::non_blocking(appender))
}
