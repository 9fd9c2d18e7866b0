// file: src/logging/logger.rs
// version: 2.0.0
// guid: 3e9a1c74-b05d-4f2e-8a63-d17c4b9e20f8

//! Logger initialization and configuration

use crate::{ProvisionError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Instrument;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn level_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    }
}

/// Initialize the logging system; output goes to stderr
pub fn init_logger(verbose: bool, quiet: bool) -> Result<()> {
    tracing_subscriber::registry()
        .with(level_filter(verbose, quiet))
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .map_err(|e| ProvisionError::config(format!("Failed to initialize logger: {}", e)))?;

    Ok(())
}

/// Initialize structured JSON logging; `RUST_LOG` overrides the level
pub fn init_json_logger() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| {
            ProvisionError::config(format!("Failed to initialize JSON logger: {}", e))
        })?;

    Ok(())
}

/// Timestamped log file name for one run
pub fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("blx-provisioner-{}.log", now.format("%Y%m%d-%H%M%S"))
}

/// Console logging plus a full debug log in `dir`; returns the log file path
pub fn init_file_logger(dir: &Path, verbose: bool, quiet: bool) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(log_file_name(chrono::Local::now()));
    let file = File::create(&path)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact()
                .with_filter(level_filter(verbose, quiet)),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new("debug")),
        )
        .try_init()
        .map_err(|e| ProvisionError::config(format!("Failed to initialize logger: {}", e)))?;

    Ok(path)
}

/// Run `f` inside an `operation` span carrying a fresh run id
pub async fn with_async_operation_span<F, Fut, R>(operation: &str, f: F) -> R
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = R>,
{
    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("operation", name = operation, id = %run_id);
    async move { f().await }.instrument(span).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name_is_timestamped() {
        let at = chrono::Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .single()
            .unwrap();
        assert_eq!(log_file_name(at), "blx-provisioner-20240309-070501.log");
    }

    #[test]
    fn test_init_logger_twice_is_an_error_not_a_panic() {
        let first = init_logger(false, false);
        let second = init_logger(true, false);
        // At most one global subscriber can be installed per process
        assert!(first.is_err() || second.is_err());
    }

    #[tokio::test]
    async fn test_with_async_operation_span() {
        let mut executed = false;

        let result = with_async_operation_span("setup", || async {
            executed = true;
            "async_result"
        })
        .await;

        assert!(executed);
        assert_eq!(result, "async_result");
    }
}
