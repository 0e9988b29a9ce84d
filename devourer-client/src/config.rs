use devourer_core::{ClientError, DevourerResult};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:5005/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_DATA_FILE: &str = "tasks.json";
pub const DEFAULT_LOG_FILE: &str = "startup.log";
pub const DEFAULT_LOG_FILTER: &str = "devourer=info,devourer_client=info";

/// Runtime settings for the coordinator and its backends.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the REST backend; `None` runs purely on the local file.
    pub api_base_url: Option<String>,
    pub request_timeout: Duration,
    pub data_file: PathBuf,
    /// Append-only log file; `None` logs to stderr.
    pub log_file: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: Some(DEFAULT_API_URL.to_string()),
            request_timeout: DEFAULT_TIMEOUT,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            log_file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults without a backend, storing tasks in `data_file`.
    pub fn offline(data_file: impl Into<PathBuf>) -> Self {
        Self {
            api_base_url: None,
            data_file: data_file.into(),
            ..Self::default()
        }
    }

    /// Read overrides from the process environment:
    ///
    /// - `DEVOURER_API_URL`: backend URL; empty or `off` disables it
    /// - `DEVOURER_TIMEOUT_MS`: per-request timeout
    /// - `DEVOURER_DATA_FILE`: local task file
    /// - `DEVOURER_LOG_FILE`: log file, `-` for stderr
    /// - `RUST_LOG`: log filter
    pub fn from_env() -> DevourerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> DevourerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DEVOURER_API_URL") {
            let url = url.trim();
            config.api_base_url = if url.is_empty() || url.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(url.to_string())
            };
        }

        if let Some(raw) = lookup("DEVOURER_TIMEOUT_MS") {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!("DEVOURER_TIMEOUT_MS must be a number, got {raw:?}"))
            })?;
            if millis == 0 {
                return Err(ClientError::Config(
                    "DEVOURER_TIMEOUT_MS must be greater than zero".into(),
                ));
            }
            config.request_timeout = Duration::from_millis(millis);
        }

        if let Some(path) = lookup("DEVOURER_DATA_FILE").filter(|p| !p.trim().is_empty()) {
            config.data_file = PathBuf::from(path);
        }

        if let Some(path) = lookup("DEVOURER_LOG_FILE") {
            config.log_file = match path.trim() {
                "" | "-" => None,
                p => Some(PathBuf::from(p)),
            };
        }

        if let Some(filter) = lookup("RUST_LOG").filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }

        Ok(config)
    }
}
