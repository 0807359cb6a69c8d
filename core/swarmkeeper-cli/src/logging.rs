//! Logging to stderr plus a daily rolling file in `~/.swarmkeeper/logs`.
//!
//! `RUST_LOG` controls the filter (default `info`). `SWARMKEEPER_DEBUG_LOG=1`
//! forces `debug`. The returned guard must live until exit or buffered file
//! lines are lost.

use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEBUG_ENV: &str = "SWARMKEEPER_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "swarmkeeper.log";

pub fn init() -> Option<WorkerGuard> {
    let log_dir = swarmkeeper_core::config::log_dir()
        .ok()
        .filter(|dir| fs_err::create_dir_all(dir).is_ok());

    let Some(log_dir) = log_dir else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
        return None;
    };

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .try_init()
        .ok()
        .map(|_| guard)
}

fn filter() -> EnvFilter {
    if debug_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn debug_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}
