//! Log routing for the import server and CLI.
//!
//! Import batches log dispatch, per-job outcomes and batch completion. Those events go to
//! stdout and to a log file so a long CLI run can be inspected afterwards. The file is
//! `IMPORT_LOG_FILE` when set, otherwise `logs/rusty-import.log`.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "rusty-import.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` filters both outputs and defaults to `info`.
///
/// Import progress is logged at `debug`, so `RUST_LOG=rustyimport=debug` shows every
/// forwarded engine update.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    match import_log_writer() {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

/// Open the import log for appending. Stdout logging continues alone if this fails.
fn import_log_writer() -> Option<NonBlocking> {
    let (non_blocking, guard) = match std::env::var("IMPORT_LOG_FILE") {
        Ok(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(&path));
            match file {
                Ok(file) => tracing_appender::non_blocking(file),
                Err(err) => {
                    eprintln!("Failed to open import log {path}: {err}");
                    return None;
                }
            }
        }
        Err(_) => {
            if let Err(err) = std::fs::create_dir_all(DEFAULT_LOG_DIR) {
                eprintln!("Failed to create {DEFAULT_LOG_DIR} directory: {err}");
                return None;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::never(
                DEFAULT_LOG_DIR,
                DEFAULT_LOG_FILE,
            ))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
