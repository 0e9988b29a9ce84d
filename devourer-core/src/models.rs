use crate::filter::tag_eq;
use crate::observable::{CollectionChange, ObservableVec};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Tag added to a task as a side effect of marking it completed.
pub const COMPLETED_TAG: &str = "completed";

const COPY_SUFFIX: &str = "(Copy)";

/// Client-local identity of a task. Never serialized; a task keeps the same
/// key for as long as it lives in memory, even before the backend assigns
/// it an `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey(Uuid);

impl TaskKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-local identity of a sub-task or attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemKey(Uuid);

impl ItemKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubTask {
    #[serde(skip, default = "ItemKey::generate")]
    pub key: ItemKey,
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub is_completed: bool,
}

impl SubTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            key: ItemKey::generate(),
            id: 0,
            title: title.into(),
            is_completed: false,
        }
    }

    /// Same values, new identity, not yet known to the backend.
    pub fn duplicate(&self) -> Self {
        Self {
            key: ItemKey::generate(),
            id: 0,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Attachment {
    #[serde(skip, default = "ItemKey::generate")]
    pub key: ItemKey,
    #[serde(default)]
    pub id: i64,
    pub file_name: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub size_bytes: i64,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, file_path: Option<String>, size_bytes: i64) -> Self {
        Self {
            key: ItemKey::generate(),
            id: 0,
            file_name: file_name.into(),
            file_path,
            size_bytes,
        }
    }

    pub fn duplicate(&self) -> Self {
        Self {
            key: ItemKey::generate(),
            id: 0,
            ..self.clone()
        }
    }

    /// Whether the referenced file exists on this machine. Attachments
    /// synced from elsewhere often point at paths that do not.
    pub fn is_available(&self) -> bool {
        self.file_path
            .as_deref()
            .map(|p| std::path::Path::new(p).is_file())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubTaskProgress {
    pub total: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    #[serde(skip, default = "TaskKey::generate")]
    key: TaskKey,
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "due_date_format")]
    pub due_date: NaiveDateTime,
    #[serde(default)]
    is_completed: bool,
    #[serde(default)]
    tags: ObservableVec<String>,
    #[serde(default)]
    sub_tasks: ObservableVec<SubTask>,
    #[serde(default)]
    attachments: ObservableVec<Attachment>,
}

impl Task {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        due_date: NaiveDateTime,
    ) -> Self {
        Self {
            key: TaskKey::generate(),
            id: 0,
            title: title.into(),
            description: description.into(),
            due_date,
            is_completed: false,
            tags: ObservableVec::new(),
            sub_tasks: ObservableVec::new(),
            attachments: ObservableVec::new(),
        }
    }

    pub fn key(&self) -> TaskKey {
        self.key
    }

    /// True once the backend has assigned this task an id.
    pub fn is_persisted_remotely(&self) -> bool {
        self.id > 0
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn tags(&self) -> &ObservableVec<String> {
        &self.tags
    }

    pub fn sub_tasks(&self) -> &ObservableVec<SubTask> {
        &self.sub_tasks
    }

    pub fn attachments(&self) -> &ObservableVec<Attachment> {
        &self.attachments
    }

    pub fn sub_tasks_total_count(&self) -> usize {
        self.sub_tasks.len()
    }

    pub fn sub_tasks_completed_count(&self) -> usize {
        self.sub_tasks.iter().filter(|s| s.is_completed).count()
    }

    pub fn progress(&self) -> SubTaskProgress {
        SubTaskProgress {
            total: self.sub_tasks_total_count(),
            completed: self.sub_tasks_completed_count(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| tag_eq(t, tag))
    }

    /// Marking a task completed adds [`COMPLETED_TAG`]; un-completing it
    /// leaves the tags alone. Returns the tag change when one happened.
    pub fn set_completed(&mut self, completed: bool) -> Option<CollectionChange> {
        self.is_completed = completed;
        if completed && !self.tags.iter().any(|t| t == COMPLETED_TAG) {
            return Some(self.tags.push(COMPLETED_TAG.to_string()));
        }
        None
    }

    /// Set the flag without the tag side effect (loading canonical copies).
    pub(crate) fn restore_completed(&mut self, completed: bool) {
        self.is_completed = completed;
    }

    /// Blank tags and case-insensitive duplicates are ignored.
    pub fn add_tag(&mut self, tag: &str) -> Option<CollectionChange> {
        let tag = tag.trim();
        if tag.is_empty() || self.has_tag(tag) {
            return None;
        }
        Some(self.tags.push(tag.to_string()))
    }

    pub fn remove_tag(&mut self, tag: &str) -> Option<CollectionChange> {
        let index = self.tags.iter().position(|t| tag_eq(t, tag))?;
        self.tags.remove(index).map(|(_, change)| change)
    }

    pub fn add_sub_task(&mut self, sub_task: SubTask) -> CollectionChange {
        self.sub_tasks.push(sub_task)
    }

    pub fn sub_task(&self, key: ItemKey) -> Option<&SubTask> {
        self.sub_tasks.iter().find(|s| s.key == key)
    }

    pub fn update_sub_task<F>(&mut self, key: ItemKey, f: F) -> Option<CollectionChange>
    where
        F: FnOnce(&mut SubTask),
    {
        let index = self.sub_tasks.iter().position(|s| s.key == key)?;
        self.sub_tasks.update(index, f)
    }

    pub fn remove_sub_task(&mut self, key: ItemKey) -> Option<(SubTask, CollectionChange)> {
        let index = self.sub_tasks.iter().position(|s| s.key == key)?;
        self.sub_tasks.remove(index)
    }

    pub fn add_attachment(&mut self, attachment: Attachment) -> CollectionChange {
        self.attachments.push(attachment)
    }

    pub fn attachment(&self, key: ItemKey) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.key == key)
    }

    /// Record the id the backend assigned to a nested item.
    pub fn assign_sub_task_id(&mut self, key: ItemKey, id: i64) -> Option<CollectionChange> {
        self.update_sub_task(key, |s| s.id = id)
    }

    pub fn assign_attachment_id(&mut self, key: ItemKey, id: i64) -> Option<CollectionChange> {
        let index = self.attachments.iter().position(|a| a.key == key)?;
        self.attachments.update(index, |a| a.id = id)
    }

    pub fn remove_attachment(&mut self, key: ItemKey) -> Option<(Attachment, CollectionChange)> {
        let index = self.attachments.iter().position(|a| a.key == key)?;
        self.attachments.remove(index)
    }

    /// Install new nested collection instances, discarding the old ones.
    /// Listeners attached to the old instances must be moved by the caller.
    pub fn replace_nested(
        &mut self,
        tags: ObservableVec<String>,
        sub_tasks: ObservableVec<SubTask>,
        attachments: ObservableVec<Attachment>,
    ) {
        self.tags = tags;
        self.sub_tasks = sub_tasks;
        self.attachments = attachments;
    }

    pub fn into_nested(
        self,
    ) -> (
        ObservableVec<String>,
        ObservableVec<SubTask>,
        ObservableVec<Attachment>,
    ) {
        (self.tags, self.sub_tasks, self.attachments)
    }

    /// Drop the backend ids of nested items after the backend regenerated
    /// them and we could not learn the new ones.
    pub fn forget_nested_ids(&mut self) {
        for i in 0..self.sub_tasks.len() {
            self.sub_tasks.update(i, |s| s.id = 0);
        }
        for i in 0..self.attachments.len() {
            self.attachments.update(i, |a| a.id = 0);
        }
    }

    /// The task produced by "clone": same values under a "(Copy)" title,
    /// not completed, with fresh identities everywhere.
    pub fn duplicate(&self) -> Task {
        let title = if self.title.trim().is_empty() {
            COPY_SUFFIX.to_string()
        } else {
            format!("{} {}", self.title, COPY_SUFFIX)
        };
        Task {
            key: TaskKey::generate(),
            id: 0,
            title,
            description: self.description.clone(),
            due_date: self.due_date,
            is_completed: false,
            tags: self.tags.iter().cloned().collect(),
            sub_tasks: self.sub_tasks.iter().map(SubTask::duplicate).collect(),
            attachments: self.attachments.iter().map(Attachment::duplicate).collect(),
        }
    }
}

/// Due dates are naive local timestamps. Files written by the desktop app
/// sometimes carry an offset; it is dropped on read.
pub mod due_date_format {
    use super::*;

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn serialize<S: Serializer>(
        date: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<NaiveDateTime, String> {
        if let Ok(naive) = raw.parse::<NaiveDateTime>() {
            return Ok(naive);
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.naive_local())
            .map_err(|e| format!("invalid due date {raw:?}: {e}"))
    }
}
