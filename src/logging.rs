//! Tracing setup
//!
//! Logs go to stdout and, when configured, to a daily rotated file that keeps
//! the last seven days.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Number of rotated log files kept on disk
pub const LOG_RETENTION_FILES: usize = 7;

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must live as long
/// as the process.
pub fn init(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter_directives(&config.logging.level, config.database.echo).into());

    let (file_layer, guard) = match &config.logging.file {
        Some(path) => {
            let appender = file_appender(path)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Map a configured level name onto a tracing level.
///
/// Accepts the usual names plus `WARNING`, `SUCCESS` and `CRITICAL`.
/// Unknown names fall back to `info`.
pub fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Build the default filter for this crate and its HTTP stack.
pub fn filter_directives(level: &str, sql_echo: bool) -> String {
    let level = normalize_level(level);
    let mut directives = format!("blogstarter={level},tower_http={level},{level}");
    if sql_echo {
        directives.push_str(",sqlx=debug");
    }
    directives
}

fn file_appender(path: &Path) -> Result<RollingFileAppender> {
    let (dir, prefix, suffix) = split_log_path(path);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {:?}", dir))?;

    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(LOG_RETENTION_FILES);
    if let Some(suffix) = suffix {
        builder = builder.filename_suffix(suffix);
    }
    builder
        .build(&dir)
        .with_context(|| format!("Failed to open log file in {:?}", dir))
}

/// Split `logs/app_{time}.log` into `("logs", "app", Some("log"))`.
///
/// A `{time}` placeholder is dropped since the appender dates each file.
fn split_log_path(path: &Path) -> (PathBuf, String, Option<String>) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace("{time}", ""))
        .unwrap_or_default();
    let stem = stem.trim_end_matches(['_', '-', '.']).to_string();
    let prefix = if stem.is_empty() { "app".to_string() } else { stem };
    let suffix = path.extension().map(|e| e.to_string_lossy().into_owned());

    (dir, prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level("INFO"), "info");
        assert_eq!(normalize_level("warning"), "warn");
        assert_eq!(normalize_level("CRITICAL"), "error");
        assert_eq!(normalize_level("SUCCESS"), "info");
        assert_eq!(normalize_level(" debug "), "debug");
        assert_eq!(normalize_level("bogus"), "info");
    }

    #[test]
    fn test_filter_directives() {
        assert_eq!(
            filter_directives("DEBUG", false),
            "blogstarter=debug,tower_http=debug,debug"
        );
        assert!(filter_directives("INFO", true).ends_with(",sqlx=debug"));
    }

    #[test]
    fn test_split_log_path() {
        let (dir, prefix, suffix) = split_log_path(Path::new("logs/app_{time}.log"));
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(prefix, "app");
        assert_eq!(suffix.as_deref(), Some("log"));

        let (dir, prefix, suffix) = split_log_path(Path::new("server"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(prefix, "server");
        assert_eq!(suffix, None);
    }

    #[test]
    fn test_file_appender_creates_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("app.log");
        file_appender(&path).unwrap();
        assert!(temp_dir.path().join("nested").is_dir());
    }
}
