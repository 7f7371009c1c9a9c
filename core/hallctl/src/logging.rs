//! File logging for `hallctl`.
//!
//! `hallctl` runs from broadcast receivers and init scripts where stderr goes
//! nowhere, so logs land in a daily rolling file under
//! `~/.hallmonitor/logs`. `HALLCTL_LOG` overrides the filter.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_ENV: &str = "HALLCTL_LOG";
const LOG_FILE_PREFIX: &str = "hallctl.log";

pub fn log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".hallmonitor").join("logs"))
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// or buffered lines are lost.
pub fn init() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(dir) = log_dir() else {
        // No home directory: logging is best-effort.
        tracing_subscriber::registry().with(filter).init();
        return None;
    };
    if fs_err::create_dir_all(&dir).is_err() {
        tracing_subscriber::registry().with(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .with(filter)
        .init();
    Some(guard)
}
