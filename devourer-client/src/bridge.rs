//! Routes nested-collection changes from individual tasks to the coordinator.
//!
//! The bridge remembers, per task, which collection instances (tags,
//! sub-tasks, attachments) it listens to. A change coming from an instance
//! it is not attached to, such as the detached copies inside an edit
//! session or a collection that has since been replaced, is dropped. When a
//! task's collections are swapped out the owner must call [`CollectionBridge::rehook`]
//! so later changes keep flowing.

use crate::events::{EventDispatcher, TaskEvent};
use devourer_core::{ChangeKind, CollectionChange, CollectionId, SubTaskProgress, Task, TaskKey};
use std::collections::HashMap;
use std::sync::Arc;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum NestedKind {
    Tags,
    SubTasks,
    Attachments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedChange {
    pub kind: NestedKind,
    pub change: CollectionChange,
}

impl NestedChange {
    pub fn tags(change: CollectionChange) -> Self {
        Self {
            kind: NestedKind::Tags,
            change,
        }
    }

    pub fn sub_tasks(change: CollectionChange) -> Self {
        Self {
            kind: NestedKind::SubTasks,
            change,
        }
    }

    pub fn attachments(change: CollectionChange) -> Self {
        Self {
            kind: NestedKind::Attachments,
            change,
        }
    }

    /// One reset per nested collection, for after a wholesale replacement.
    pub fn resets_of(task: &Task) -> [NestedChange; 3] {
        let reset = |collection| CollectionChange {
            collection,
            kind: ChangeKind::Reset,
            index: None,
        };
        [
            Self::tags(reset(task.tags().id())),
            Self::sub_tasks(reset(task.sub_tasks().id())),
            Self::attachments(reset(task.attachments().id())),
        ]
    }
}

/// What the coordinator has to do after an accepted change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaction {
    pub refresh_tags: bool,
    pub progress: SubTaskProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hooks {
    tags: CollectionId,
    sub_tasks: CollectionId,
    attachments: CollectionId,
}

impl Hooks {
    fn of(task: &Task) -> Self {
        Self {
            tags: task.tags().id(),
            sub_tasks: task.sub_tasks().id(),
            attachments: task.attachments().id(),
        }
    }

    fn listens_to(&self, kind: NestedKind, collection: CollectionId) -> bool {
        match kind {
            NestedKind::Tags => self.tags == collection,
            NestedKind::SubTasks => self.sub_tasks == collection,
            NestedKind::Attachments => self.attachments == collection,
        }
    }
}

pub struct CollectionBridge {
    hooks: HashMap<TaskKey, Hooks>,
    dispatcher: Arc<EventDispatcher>,
}

impl CollectionBridge {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            hooks: HashMap::new(),
            dispatcher,
        }
    }

    pub fn attach(&mut self, task: &Task) {
        self.hooks.insert(task.key(), Hooks::of(task));
    }

    pub fn detach(&mut self, key: TaskKey) -> bool {
        self.hooks.remove(&key).is_some()
    }

    pub fn clear(&mut self) {
        self.hooks.clear();
    }

    /// Move listeners from the task's previous collection instances to its
    /// current ones.
    pub fn rehook(&mut self, task: &Task) {
        let current = Hooks::of(task);
        match self.hooks.insert(task.key(), current) {
            Some(previous) if previous != current => {
                tracing::debug!("Re-attached nested collections of task {}", task.key());
            }
            Some(_) => {}
            None => {
                tracing::debug!("Attached nested collections of new task {}", task.key());
            }
        }
    }

    pub fn is_attached(&self, key: TaskKey, kind: NestedKind, collection: CollectionId) -> bool {
        self.hooks
            .get(&key)
            .map(|hooks| hooks.listens_to(kind, collection))
            .unwrap_or(false)
    }

    /// Accept a change reported by one of `task`'s collections.
    ///
    /// Counters are taken from the task as it is now, before anything is
    /// queued, so observers always see the post-change values. Returns
    /// `None` when the change came from a collection this bridge does not
    /// listen to.
    pub fn publish(&self, task: &Task, nested: NestedChange) -> Option<Reaction> {
        if !self.is_attached(task.key(), nested.kind, nested.change.collection) {
            tracing::debug!(
                "Dropping {} change on detached {} collection {} of task {}",
                nested.change.kind,
                nested.kind,
                nested.change.collection,
                task.key()
            );
            return None;
        }

        let progress = task.progress();
        self.dispatcher.emit(TaskEvent::NestedChanged {
            key: task.key(),
            collection: nested.kind,
            change: nested.change.kind,
            progress,
        });

        Some(Reaction {
            refresh_tags: nested.kind == NestedKind::Tags,
            progress,
        })
    }
}
