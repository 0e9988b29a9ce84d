//! Process-wide logging bootstrap.
//!
//! Call [`init_logging`] once at startup. Output goes to an append-only
//! file (the diagnostics log next to the task file) or to stderr.

use devourer_core::{ClientError, DevourerResult};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_TARGET: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Install the global subscriber. Repeated calls after a successful one are
/// no-ops; an invalid filter is always rejected.
pub fn init_logging(filter: &str, log_file: Option<&Path>) -> DevourerResult<()> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| ClientError::Logging(format!("Invalid log filter: {e}")))?;

    if LOG_TARGET.get().is_some() {
        return Ok(());
    }

    let registry = tracing_subscriber::registry().with(filter);
    let result = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| {
                    ClientError::Logging(format!("Cannot create {}: {e}", parent.display()))
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ClientError::Logging(format!("Cannot open {}: {e}", path.display())))?;
            registry
                .with(
                    fmt::layer()
                        .with_ansi(false)
                        .with_target(true)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()
        }
        None => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| ClientError::Logging(format!("Failed to init tracing: {e}")))?;

    let _ = LOG_TARGET.set(log_file.map(Path::to_path_buf));
    tracing::info!("Logging initialized");
    Ok(())
}

/// Where logs are going, once initialized.
pub fn log_target() -> Option<&'static Path> {
    LOG_TARGET.get().and_then(|target| target.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        let err = init_logging("devourer=loudest", None).unwrap_err();
        assert!(matches!(err, ClientError::Logging(_)));
    }

    #[test]
    fn test_file_logging_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("startup.log");

        init_logging("info", Some(&path)).unwrap();
        // Second call is a no-op
        init_logging("info", Some(&path)).unwrap();
        tracing::info!("hello from the log test");

        assert_eq!(log_target(), Some(path.as_path()));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Logging initialized"));
        assert!(contents.contains("hello from the log test"));
    }
}
