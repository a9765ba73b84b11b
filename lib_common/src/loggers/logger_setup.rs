//! # Logging Bootstrap
//!
//! Installs the global `tracing` subscriber for a binary:
//! - an `EnvFilter` from `RUST_LOG`, falling back to the configured level,
//! - a human-readable stdout layer,
//! - a JSON file layer on a non-blocking writer, one file per run named
//!   `<app_name>_<timestamp>.log`.
//!
//! Older `.log` files in the directory are removed first, keeping only the
//! newest one from the previous run.

use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid log filter '{0}'")]
    Filter(String),

    #[error("A global subscriber is already installed: {0}")]
    Init(String),
}

/// Name of this run's log file.
pub fn log_file_name(app_name: &str) -> String {
    format!(
        "{}_{}.log",
        app_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    )
}

/// Installs the subscriber. Keep the returned guard alive for the whole
/// process; dropping it flushes and stops the file writer.
pub fn setup_logging(
    log_dir: &Path,
    log_level: &str,
    app_name: &str,
) -> Result<WorkerGuard, LoggerError> {
    fs::create_dir_all(log_dir)?;
    cleanup_old_logs(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file_name(app_name));
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|_| LoggerError::Filter(log_level.to_string()))?;

    let console_layer = fmt::layer().with_target(true);
    let file_layer = fmt::layer().with_ansi(false).with_writer(writer).json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggerError::Init(e.to_string()))?;

    tracing::info!(level = log_level, dir = %log_dir.display(), "logging initialized");
    Ok(guard)
}

/// Deletes every `.log` file in `log_dir` except the most recently
/// modified one. Returns the deleted paths.
pub fn cleanup_old_logs(log_dir: &Path) -> Result<Vec<PathBuf>, LoggerError> {
    let mut entries: Vec<(PathBuf, SystemTime)> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
        .filter_map(|p| {
            let modified = fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            Some((p, modified))
        })
        .collect();

    // Newest first
    entries.sort_by_key(|(_, modified)| Reverse(*modified));

    let mut removed = Vec::new();
    for (path, _) in entries.into_iter().skip(1) {
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    #[test]
    fn test_cleanup_keeps_only_newest_log() {
        let dir = tempfile::tempdir().unwrap();
        let oldest = touch(dir.path(), "server_hypermon_a.log", 300);
        let middle = touch(dir.path(), "server_hypermon_b.log", 200);
        let newest = touch(dir.path(), "server_hypermon_c.log", 10);
        let other = touch(dir.path(), "notes.txt", 500);

        let removed = cleanup_old_logs(dir.path()).unwrap();

        assert_eq!(removed.len(), 2);
        assert!(!oldest.exists());
        assert!(!middle.exists());
        assert!(newest.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_cleanup_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cleanup_old_logs(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_log_file_name_shape() {
        let name = log_file_name("server_hypermon");
        assert!(name.starts_with("server_hypermon_"));
        assert!(name.ends_with(".log"));
    }
}
