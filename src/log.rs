use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "ghg-inventory.log";

/// Installs the global subscriber. `RUST_LOG` wins over the `info` default.
///
/// With a log directory, output goes to a daily rolling file through a
/// non-blocking writer and the returned guard must be held until exit so the
/// buffer is flushed. Without one, logs go to stderr. Calling this twice is a
/// no-op.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let file_appender = rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            fmt()
                .with_env_filter(filter())
                .with_writer(non_blocking)
                .with_ansi(false) // no color codes in file
                .try_init()
                .ok()
                .map(|_| guard)
        }
        None => {
            let _ = fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .try_init();
            None
        }
    }
}
