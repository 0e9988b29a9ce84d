pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod local_store;
pub mod logging;
pub mod remote;

pub use bridge::{CollectionBridge, NestedChange, NestedKind, Reaction};
pub use config::ClientConfig;
pub use coordinator::{
    EditSession, LoadReport, LoadSource, Rejection, SyncCoordinator, WriteOutcome,
};
pub use events::{EventDispatcher, EventType, TaskEvent};
pub use local_store::JsonFileStore;
pub use logging::init_logging;
pub use remote::{HttpTaskRemote, TaskRemote};
