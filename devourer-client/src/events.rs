//! Event callback system for the task coordinator
//!
//! The coordinator and the collection bridge emit [`TaskEvent`]s whenever
//! the in-memory task list changes or a persistence attempt finishes. Views
//! register callbacks here instead of polling.
//!
//! # Thread Safety
//!
//! The event system uses a single-thread callback model:
//! 1. Events can be generated from any thread
//! 2. Events are queued for processing
//! 3. Callbacks are only invoked when `process_events()` is called
//! 4. All callbacks execute on the thread that registered them
//!
//! Until the first callback is registered nothing is queued.
//!
//! Event payloads are snapshots taken when the event was emitted (titles,
//! sub-task counters), so a callback never reads half-applied state.

use crate::bridge::NestedKind;
use crate::coordinator::{LoadSource, WriteOutcome};
use devourer_core::{ChangeKind, ClientError, DevourerResult, SubTaskProgress, TaskKey};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread::{self, ThreadId};

/// Event categories, used for filtered registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    TaskAdded,
    TaskUpdated,
    TaskRemoved,
    NestedChanged,
    TagsChanged,
    FilterChanged,
    CollectionReset,
    Persisted,
    RemoteFailed,
    PersistFailed,
    LoadFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A task entered the collection (new, cloned, or adopted from the backend)
    TaskAdded { key: TaskKey, title: String },
    /// Fields of a task changed
    TaskUpdated { key: TaskKey, title: String },
    TaskRemoved { key: TaskKey },
    /// Tags, sub-tasks or attachments of a task changed. `progress` is
    /// computed before the event is queued.
    NestedChanged {
        key: TaskKey,
        collection: NestedKind,
        change: ChangeKind,
        progress: SubTaskProgress,
    },
    /// The set of tags offered for filtering changed
    TagsChanged { tags: Vec<String> },
    FilterChanged {
        search_text: String,
        selected_tag: String,
    },
    /// The whole collection was replaced
    CollectionReset { source: LoadSource, count: usize },
    /// A write finished; `key` is `None` for whole-collection writes
    Persisted {
        key: Option<TaskKey>,
        outcome: WriteOutcome,
    },
    /// A backend call failed and was absorbed
    RemoteFailed { operation: String, message: String },
    /// The local fallback could not be written either
    PersistFailed { message: String },
    /// Neither the backend nor the local file could be loaded at startup
    LoadFailed { message: String },
}

impl TaskEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            TaskEvent::TaskAdded { .. } => EventType::TaskAdded,
            TaskEvent::TaskUpdated { .. } => EventType::TaskUpdated,
            TaskEvent::TaskRemoved { .. } => EventType::TaskRemoved,
            TaskEvent::NestedChanged { .. } => EventType::NestedChanged,
            TaskEvent::TagsChanged { .. } => EventType::TagsChanged,
            TaskEvent::FilterChanged { .. } => EventType::FilterChanged,
            TaskEvent::CollectionReset { .. } => EventType::CollectionReset,
            TaskEvent::Persisted { .. } => EventType::Persisted,
            TaskEvent::RemoteFailed { .. } => EventType::RemoteFailed,
            TaskEvent::PersistFailed { .. } => EventType::PersistFailed,
            TaskEvent::LoadFailed { .. } => EventType::LoadFailed,
        }
    }
}

struct CallbackEntry {
    callback: Box<dyn Fn(TaskEvent) + Send>,
    event_filter: Option<EventType>,
}

/// Thread-safe event dispatcher for managing callbacks and event processing
///
/// # Example
///
/// ```rust,no_run
/// use devourer_client::events::{EventDispatcher, TaskEvent};
///
/// let dispatcher = EventDispatcher::new();
///
/// dispatcher.register_callback(|event| {
///     if let TaskEvent::NestedChanged { key, progress, .. } = event {
///         println!("{key}: {}/{}", progress.completed, progress.total);
///     }
/// }).unwrap();
///
/// // In the UI loop
/// dispatcher.process_events().unwrap();
/// ```
pub struct EventDispatcher {
    callbacks: Mutex<Vec<CallbackEntry>>,
    event_queue: Mutex<mpsc::Receiver<TaskEvent>>,
    event_sender: mpsc::Sender<TaskEvent>,
    callback_thread_id: Mutex<Option<ThreadId>>,
    listening: AtomicBool,
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            callbacks: Mutex::new(Vec::new()),
            event_queue: Mutex::new(receiver),
            event_sender: sender,
            callback_thread_id: Mutex::new(None),
            listening: AtomicBool::new(false),
        }
    }

    /// Helper to set callback thread ID on first registration
    fn ensure_callback_thread(&self) -> DevourerResult<()> {
        let mut thread_id = self
            .callback_thread_id
            .lock()
            .map_err(|_| ClientError::LockError("thread ID".into()))?;
        if thread_id.is_none() {
            *thread_id = Some(thread::current().id());
            tracing::info!(
                "Event callbacks will be processed on thread: {:?}",
                thread::current().id()
            );
        }
        Ok(())
    }

    /// Register a callback for all events
    pub fn register_callback<F>(&self, callback: F) -> DevourerResult<()>
    where
        F: Fn(TaskEvent) + Send + 'static,
    {
        self.push_entry(Box::new(callback), None)
    }

    /// Register a callback that only receives events of one type
    pub fn register_callback_filtered<F>(
        &self,
        callback: F,
        event_filter: EventType,
    ) -> DevourerResult<()>
    where
        F: Fn(TaskEvent) + Send + 'static,
    {
        self.push_entry(Box::new(callback), Some(event_filter))
    }

    fn push_entry(
        &self,
        callback: Box<dyn Fn(TaskEvent) + Send>,
        event_filter: Option<EventType>,
    ) -> DevourerResult<()> {
        self.ensure_callback_thread()?;

        let mut callbacks = self
            .callbacks
            .lock()
            .map_err(|_| ClientError::LockError("callbacks".into()))?;

        callbacks.push(CallbackEntry {
            callback,
            event_filter,
        });
        self.listening.store(true, Ordering::Release);

        Ok(())
    }

    /// Queue an event for later processing on the callback thread. Events
    /// emitted before the first callback is registered are dropped.
    pub fn emit(&self, event: TaskEvent) {
        if !self.listening.load(Ordering::Acquire) {
            tracing::trace!("No event callbacks registered, dropping {:?}", event.event_type());
            return;
        }
        if self.event_sender.send(event).is_err() {
            tracing::error!("Failed to queue event - receiver may have been dropped");
        }
    }

    /// Process all queued events. This MUST be called on the same thread where callbacks were registered.
    pub fn process_events(&self) -> DevourerResult<usize> {
        {
            let thread_id = self
                .callback_thread_id
                .lock()
                .map_err(|_| ClientError::LockError("thread ID".into()))?;
            match *thread_id {
                Some(expected) if thread::current().id() != expected => {
                    return Err(ClientError::ThreadSafetyViolation);
                }
                Some(_) => {}
                None => return Err(ClientError::NoCallbacksRegistered),
            }
        }

        let callbacks = self
            .callbacks
            .lock()
            .map_err(|_| ClientError::LockError("callbacks".into()))?;
        let receiver = self
            .event_queue
            .lock()
            .map_err(|_| ClientError::LockError("event queue".into()))?;

        let mut processed_count = 0;
        while let Ok(event) = receiver.try_recv() {
            let event_type = event.event_type();
            for entry in callbacks.iter() {
                if let Some(filter) = entry.event_filter {
                    if filter != event_type {
                        continue;
                    }
                }
                (entry.callback)(event.clone());
            }
            processed_count += 1;
        }

        Ok(processed_count)
    }

    /// Throw away queued events without delivering them.
    pub fn discard_pending(&self) -> DevourerResult<usize> {
        let receiver = self
            .event_queue
            .lock()
            .map_err(|_| ClientError::LockError("event queue".into()))?;
        Ok(receiver.try_iter().count())
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
