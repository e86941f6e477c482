//! # Structured Logging Module
//!
//! Environment-aware structured logging. Console output always; a JSON file
//! per process when `GATEWATCH_LOG_DIR` is set.
//!
//! Level defaults by environment (`GATEWATCH_ENV`, then `APP_ENV`):
//! development and test log at `debug`, production at `info`. `RUST_LOG`
//! replaces the default filter entirely.

use chrono::Utc;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize structured logging; later calls are no-ops
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = get_log_filter(&environment);

        let console = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(std::io::stdout().is_terminal())
            .with_filter(EnvFilter::new(&filter));

        let log_file = log_directory().and_then(|dir| {
            if let Err(e) = std::fs::create_dir_all(&dir) {
                eprintln!("Cannot create log directory {}: {e}", dir.display());
                return None;
            }
            let name = format!(
                "{}.{}.{}.log",
                environment,
                process::id(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            Some((dir, name))
        });

        let file_layer = log_file.as_ref().map(|(dir, name)| {
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::new(&filter))
        });

        let subscriber = tracing_subscriber::registry().with(console).with(file_layer);

        // A subscriber installed by a test harness or embedding process wins
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        let log_path = log_file
            .as_ref()
            .map(|(dir, name)| dir.join(name).display().to_string());
        tracing::info!(
            pid = process::id(),
            environment = %environment,
            filter = %filter,
            log_file = log_path.as_deref(),
            "Structured logging initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("GATEWATCH_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn log_directory() -> Option<PathBuf> {
    std::env::var("GATEWATCH_LOG_DIR")
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
}

fn get_log_filter(environment: &str) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| get_log_level(environment).to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log a worker lifecycle transition with its identity
pub fn log_worker_transition(lock_id: &str, worker_id: &str, from: &str, to: &str) {
    tracing::info!(
        lock_id = %lock_id,
        worker_id = %worker_id,
        from = %from,
        to = %to,
        "Worker state transition"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        assert!(LOGGER_INITIALIZED.get().is_some());
    }
}
