//! Diagnostic tracing.
//!
//! Separate from the run's own log feed: that lives in the store and is shown
//! by the dashboard. This module only covers `RUST_LOG`-driven diagnostics.
//!
//! Headless modes write to stderr. The TUI owns the terminal, so it writes to
//! a file instead.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where diagnostics go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    fn default_filter(&self) -> &'static str {
        match self {
            LogTarget::Stderr => "warn",
            LogTarget::File(_) => "info",
        }
    }
}

/// `<cache dir>/healing-dashboard/dashboard.log`, if the platform has a cache dir.
pub fn default_log_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("healing-dashboard").join("dashboard.log"))
}

/// Initialize the global tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` on stderr and `info` in a file.
pub fn init(target: LogTarget) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(target.default_filter()));

    match target {
        LogTarget::Stderr => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).compact())
            .try_init()
            .context("install tracing subscriber")?,
        LogTarget::File(path) => {
            let file = open_log_file(&path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .compact(),
                )
                .try_init()
                .context("install tracing subscriber")?
        }
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filters_depend_on_target() {
        assert_eq!(LogTarget::Stderr.default_filter(), "warn");
        assert_eq!(LogTarget::File("x.log".into()).default_filter(), "info");
    }

    #[test]
    fn log_file_is_created_with_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a").join("b").join("dashboard.log");
        open_log_file(&path).expect("open");
        assert!(path.exists());
    }

    #[test]
    fn default_log_file_is_namespaced() {
        if let Some(path) = default_log_file() {
            assert!(path.ends_with("healing-dashboard/dashboard.log"));
        }
    }
}
