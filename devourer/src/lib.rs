//! Devourer - personal task tracking with a REST backend and a local
//! JSON fallback
//!
//! This crate provides a unified API over the Devourer workspace.
//!
//! # Example
//!
//! ```ignore
//! use devourer::{ClientConfig, SyncCoordinator};
//!
//! let config = ClientConfig::from_env()?;
//! let mut tasks = SyncCoordinator::from_config(&config)?;
//! tasks.initialize().await;
//! tasks.add_task("Pay rent", "", due).await;
//! ```

// Re-export client types
pub use devourer_client::{
    init_logging, ClientConfig, EditSession, EventDispatcher, EventType, HttpTaskRemote,
    JsonFileStore, LoadReport, LoadSource, NestedKind, Rejection, SyncCoordinator, TaskEvent,
    TaskRemote, WriteOutcome,
};

// Re-export core types that front-ends need
pub use devourer_core::errors::{ClientError, RemoteError, StoreError};
pub use devourer_core::models::{Attachment, ItemKey, SubTask, SubTaskProgress, Task, TaskKey};
pub use devourer_core::filter::{TagSelection, TaskFilter};
pub use devourer_core::DevourerResult;
