use std::path::PathBuf;
use thiserror::Error;

/// Any failure talking to the REST backend. The coordinator treats every
/// variant the same way: log it and fall back to the local store.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Request to {path} timed out")]
    Timeout { path: String },

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Backend returned {status} for {path}")]
    Status { status: u16, path: String },

    #[error("Malformed response from {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Task {0} has not been persisted remotely")]
    NotPersisted(i64),

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Could not access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Task file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background file task failed: {0}")]
    Background(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Failed to acquire lock: {0}")]
    LockError(String),

    #[error("Thread safety violation: process_events() must be called on the registration thread")]
    ThreadSafetyViolation,

    #[error("No callbacks registered yet")]
    NoCallbacksRegistered,
}

pub type DevourerResult<T> = Result<T, ClientError>;
pub type RemoteResult<T> = Result<T, RemoteError>;
pub type StoreResult<T> = Result<T, StoreError>;
