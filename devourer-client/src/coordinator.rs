//! The synchronization / offline-fallback manager.
//!
//! [`SyncCoordinator`] owns the in-memory task list and decides for every
//! write whether it goes to the backend or to the local file. A backend
//! failure is never fatal: it is logged, reported as
//! [`TaskEvent::RemoteFailed`], and the whole collection is saved locally
//! instead. Whatever answered last is what the in-memory list reflects.

use crate::bridge::{CollectionBridge, NestedChange};
use crate::config::ClientConfig;
use crate::events::{EventDispatcher, TaskEvent};
use crate::local_store::JsonFileStore;
use crate::remote::{HttpTaskRemote, TaskRemote};
use chrono::NaiveDateTime;
use devourer_core::{
    tag_universe, Attachment, AttachmentDto, DevourerResult, ItemKey, RemoteError, RemoteResult,
    SubTask, SubTaskDto, TagSelection, Task, TaskDto, TaskFilter, TaskKey, ALL_TAGS_LABEL,
};
use std::collections::HashMap;
use std::sync::Arc;
use strum::Display;

/// Where [`SyncCoordinator::initialize`] got its tasks from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LoadSource {
    Remote,
    Local,
    /// Both sources failed
    Empty,
}

/// Why a write was refused before any I/O happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Rejection {
    #[strum(to_string = "title must not be blank")]
    BlankTitle,
    #[strum(to_string = "value must not be blank")]
    BlankValue,
    #[strum(to_string = "nothing changed")]
    Unchanged,
    #[strum(to_string = "task no longer exists")]
    TaskMissing,
    #[strum(to_string = "item no longer exists")]
    ItemMissing,
}

/// How a write ended up being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    PersistedRemote,
    /// The backend was unavailable, failed, or not applicable; the whole
    /// collection went to the local file.
    PersistedLocalFallback,
    Rejected(Rejection),
    /// The in-memory change stands but neither backend accepted it.
    NotPersisted,
}

impl WriteOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(
            self,
            WriteOutcome::PersistedRemote | WriteOutcome::PersistedLocalFallback
        )
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, WriteOutcome::Rejected(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub source: LoadSource,
    pub count: usize,
    /// Failures absorbed on the way, if any
    pub error: Option<String>,
}

/// A detached working copy of one task.
///
/// Nothing done to a session reaches the live task until
/// [`SyncCoordinator::commit_edit`]; its collections are separate instances
/// the bridge never listens to.
#[derive(Debug)]
pub struct EditSession {
    draft: Task,
}

impl EditSession {
    fn of(task: &Task) -> Self {
        Self {
            draft: task.clone(),
        }
    }

    pub fn key(&self) -> TaskKey {
        self.draft.key()
    }

    pub fn draft(&self) -> &Task {
        &self.draft
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.draft.title = title.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.draft.description = description.into();
    }

    pub fn set_due_date(&mut self, due_date: NaiveDateTime) {
        self.draft.due_date = due_date;
    }

    pub fn add_tag(&mut self, tag: &str) -> bool {
        self.draft.add_tag(tag).is_some()
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.draft.remove_tag(tag).is_some()
    }

    pub fn add_sub_task(&mut self, title: impl Into<String>) -> ItemKey {
        let sub_task = SubTask::new(title);
        let key = sub_task.key;
        self.draft.add_sub_task(sub_task);
        key
    }

    pub fn set_sub_task_completed(&mut self, key: ItemKey, completed: bool) -> bool {
        self.draft
            .update_sub_task(key, |s| s.is_completed = completed)
            .is_some()
    }

    pub fn rename_sub_task(&mut self, key: ItemKey, title: impl Into<String>) -> bool {
        let title = title.into();
        self.draft.update_sub_task(key, |s| s.title = title).is_some()
    }

    pub fn remove_sub_task(&mut self, key: ItemKey) -> bool {
        self.draft.remove_sub_task(key).is_some()
    }

    pub fn add_attachment(&mut self, attachment: Attachment) -> ItemKey {
        let key = attachment.key;
        self.draft.add_attachment(attachment);
        key
    }

    pub fn remove_attachment(&mut self, key: ItemKey) -> bool {
        self.draft.remove_attachment(key).is_some()
    }
}

/// The backend call that persists one task-scoped change.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RemoteWrite {
    WholeTask,
    AddTag(String),
    AddSubTask(ItemKey),
    UpdateSubTask(ItemKey),
    DeleteSubTask(i64),
    AddAttachment(ItemKey),
    DeleteAttachment(i64),
}

impl RemoteWrite {
    fn operation(&self) -> &'static str {
        match self {
            RemoteWrite::WholeTask => "update_task",
            RemoteWrite::AddTag(_) => "add_tag",
            RemoteWrite::AddSubTask(_) => "add_sub_task",
            RemoteWrite::UpdateSubTask(_) => "update_sub_task",
            RemoteWrite::DeleteSubTask(_) => "delete_sub_task",
            RemoteWrite::AddAttachment(_) => "add_attachment",
            RemoteWrite::DeleteAttachment(_) => "delete_attachment",
        }
    }

    /// Items the backend has never seen can only be written through the
    /// whole task.
    fn resolve(self, task: &Task) -> Self {
        match self {
            RemoteWrite::UpdateSubTask(item)
                if !task.sub_task(item).is_some_and(|s| s.id > 0) =>
            {
                RemoteWrite::WholeTask
            }
            RemoteWrite::DeleteSubTask(id) | RemoteWrite::DeleteAttachment(id) if id <= 0 => {
                RemoteWrite::WholeTask
            }
            other => other,
        }
    }
}

/// Owns the task collection and routes every write to the backend or the
/// local file.
///
/// All mutations take `&mut self`, so there is exactly one writer. To share
/// a coordinator between tokio tasks, wrap it in a `tokio::sync::Mutex`.
pub struct SyncCoordinator<R> {
    tasks: Vec<Task>,
    remote: Option<R>,
    store: JsonFileStore,
    bridge: CollectionBridge,
    filter: TaskFilter,
    tag_universe: Vec<String>,
    events: Arc<EventDispatcher>,
}

impl SyncCoordinator<HttpTaskRemote> {
    /// Coordinator over the HTTP backend and task file named in `config`.
    pub fn from_config(config: &ClientConfig) -> DevourerResult<Self> {
        let remote = config
            .api_base_url
            .as_deref()
            .map(|url| HttpTaskRemote::new(url, config.request_timeout))
            .transpose()?;
        Ok(Self::new(remote, JsonFileStore::new(&config.data_file)))
    }
}

impl<R: TaskRemote> SyncCoordinator<R> {
    pub fn new(remote: Option<R>, store: JsonFileStore) -> Self {
        let events = Arc::new(EventDispatcher::new());
        Self {
            tasks: Vec::new(),
            remote,
            store,
            bridge: CollectionBridge::new(events.clone()),
            filter: TaskFilter::default(),
            tag_universe: Vec::new(),
            events,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, key: TaskKey) -> Option<&Task> {
        self.tasks.iter().find(|t| t.key() == key)
    }

    pub fn events(&self) -> Arc<EventDispatcher> {
        self.events.clone()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn store(&self) -> &JsonFileStore {
        &self.store
    }

    fn index_of(&self, key: TaskKey) -> Option<usize> {
        self.tasks.iter().position(|t| t.key() == key)
    }

    fn task_mut(&mut self, key: TaskKey) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.key() == key)
    }

    // ---- Loading ----

    /// Load from the backend, or the local file when that fails, or start
    /// empty when both fail.
    pub async fn initialize(&mut self) -> LoadReport {
        let mut errors = Vec::new();
        let mut loaded = None;

        if let Some(remote) = &self.remote {
            let result = remote.load_all().await;
            match result {
                Ok(dtos) => {
                    tracing::info!("Loaded {} tasks from the backend", dtos.len());
                    let tasks: Vec<Task> = dtos.into_iter().map(Task::from).collect();
                    loaded = Some((LoadSource::Remote, tasks));
                }
                Err(e) => {
                    self.remote_failed("load_all", &e);
                    errors.push(e.to_string());
                }
            }
        }

        if loaded.is_none() {
            match self.store.load_all().await {
                Ok(tasks) => {
                    tracing::info!(
                        "Loaded {} tasks from {}",
                        tasks.len(),
                        self.store.path().display()
                    );
                    loaded = Some((LoadSource::Local, tasks));
                }
                Err(e) => {
                    tracing::error!("Failed to load local tasks: {}", e);
                    errors.push(e.to_string());
                }
            }
        }

        let error = (!errors.is_empty()).then(|| errors.join("; "));
        let (source, tasks) = match loaded {
            Some(loaded) => loaded,
            None => {
                let message = error.clone().unwrap_or_default();
                tracing::error!("No task source available, starting empty: {}", message);
                self.events.emit(TaskEvent::LoadFailed { message });
                (LoadSource::Empty, Vec::new())
            }
        };

        let count = tasks.len();
        self.replace_collection(source, tasks);
        LoadReport {
            source,
            count,
            error,
        }
    }

    fn replace_collection(&mut self, source: LoadSource, tasks: Vec<Task>) {
        self.bridge.clear();
        for task in &tasks {
            self.bridge.attach(task);
        }
        self.tasks = tasks;
        self.events.emit(TaskEvent::CollectionReset {
            source,
            count: self.tasks.len(),
        });
        self.refresh_tags();
    }

    // ---- Whole tasks ----

    pub async fn add_task(
        &mut self,
        title: &str,
        description: &str,
        due_date: NaiveDateTime,
    ) -> WriteOutcome {
        if title.trim().is_empty() {
            return WriteOutcome::Rejected(Rejection::BlankTitle);
        }
        self.insert_new(Task::new(title, description, due_date)).await
    }

    /// Add a copy of `key` titled "<title> (Copy)", not completed, with
    /// fresh identities for it and everything nested in it.
    pub async fn clone_task(&mut self, key: TaskKey) -> WriteOutcome {
        let Some(copy) = self.task(key).map(Task::duplicate) else {
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };
        self.insert_new(copy).await
    }

    async fn insert_new(&mut self, mut task: Task) -> WriteOutcome {
        let key = task.key();
        let mut created_remotely = false;

        if let Some(remote) = &self.remote {
            let result = remote.create_task(&TaskDto::from(&task)).await;
            match result {
                Ok(dto) => {
                    tracing::info!("Created task {} remotely", dto.id);
                    task.adopt_remote(dto);
                    created_remotely = true;
                }
                Err(e) => self.remote_failed("create_task", &e),
            }
        }

        self.bridge.attach(&task);
        self.events.emit(TaskEvent::TaskAdded {
            key,
            title: task.title.clone(),
        });
        self.tasks.push(task);
        self.refresh_tags();

        let outcome = if created_remotely {
            WriteOutcome::PersistedRemote
        } else {
            self.save_local().await
        };
        self.finish(Some(key), outcome)
    }

    pub fn begin_edit(&self, key: TaskKey) -> Option<EditSession> {
        self.task(key).map(EditSession::of)
    }

    pub fn cancel_edit(&self, session: EditSession) {
        tracing::debug!("Discarded edit of task {}", session.key());
    }

    /// Copy the session back onto its task, replacing the nested collections
    /// wholesale, and persist. A session whose task has been deleted in the
    /// meantime is dropped.
    pub async fn commit_edit(&mut self, session: EditSession) -> WriteOutcome {
        if session.draft.title.trim().is_empty() {
            return WriteOutcome::Rejected(Rejection::BlankTitle);
        }
        let key = session.key();
        let Some(index) = self.index_of(key) else {
            tracing::debug!("Task {} was deleted while being edited, dropping changes", key);
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };

        let mut draft = session.draft;
        let task = &mut self.tasks[index];
        task.title = std::mem::take(&mut draft.title);
        task.description = std::mem::take(&mut draft.description);
        task.due_date = draft.due_date;
        let (tags, sub_tasks, attachments) = draft.into_nested();
        task.replace_nested(tags, sub_tasks, attachments);

        self.after_replacement(index);
        self.persist_scoped(key, RemoteWrite::WholeTask).await
    }

    pub async fn set_completed(&mut self, key: TaskKey, completed: bool) -> WriteOutcome {
        let Some(task) = self.task_mut(key) else {
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };
        let tag_change = task.set_completed(completed);
        let title = task.title.clone();

        self.events.emit(TaskEvent::TaskUpdated { key, title });
        if let Some(change) = tag_change {
            self.publish(key, NestedChange::tags(change));
        }
        self.persist_scoped(key, RemoteWrite::WholeTask).await
    }

    /// Remove a task from memory, deleting it remotely when it has a backend
    /// id. The local file is rewritten whenever the backend did not take it.
    pub async fn delete_task(&mut self, key: TaskKey) -> WriteOutcome {
        let Some(id) = self.task(key).map(|t| t.id) else {
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };

        let mut deleted_remotely = false;
        if let Some(remote) = self.remote.as_ref().filter(|_| id > 0) {
            let result = remote.delete_task(id).await;
            match result {
                Ok(()) => {
                    tracing::info!("Deleted task {} remotely", id);
                    deleted_remotely = true;
                }
                Err(e) => self.remote_failed("delete_task", &e),
            }
        }

        if let Some(index) = self.index_of(key) {
            self.tasks.remove(index);
        }
        self.bridge.detach(key);
        self.events.emit(TaskEvent::TaskRemoved { key });
        self.refresh_tags();

        let outcome = if deleted_remotely {
            WriteOutcome::PersistedRemote
        } else {
            self.save_local().await
        };
        self.finish(Some(key), outcome)
    }

    /// Delete every completed task once `confirm` (given their count) agrees.
    /// Returns how many were removed.
    pub async fn delete_completed<F>(&mut self, confirm: F) -> usize
    where
        F: FnOnce(usize) -> bool,
    {
        let keys: Vec<TaskKey> = self
            .tasks
            .iter()
            .filter(|t| t.is_completed())
            .map(Task::key)
            .collect();
        if keys.is_empty() || !confirm(keys.len()) {
            return 0;
        }

        let mut deleted = 0;
        for key in keys {
            if !self.delete_task(key).await.is_rejected() {
                deleted += 1;
            }
        }
        tracing::info!("Deleted {} completed tasks", deleted);
        deleted
    }

    // ---- Nested collections ----

    pub async fn add_tag(&mut self, key: TaskKey, tag: &str) -> WriteOutcome {
        let tag = tag.trim();
        let Some(task) = self.task_mut(key) else {
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };
        if tag.is_empty() {
            return WriteOutcome::Rejected(Rejection::BlankValue);
        }
        let Some(change) = task.add_tag(tag) else {
            return WriteOutcome::Rejected(Rejection::Unchanged);
        };
        self.publish(key, NestedChange::tags(change));
        self.persist_scoped(key, RemoteWrite::AddTag(tag.to_string())).await
    }

    /// Tag ids are not known client-side, so removal rewrites the whole task.
    pub async fn remove_tag(&mut self, key: TaskKey, tag: &str) -> WriteOutcome {
        let Some(task) = self.task_mut(key) else {
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };
        let Some(change) = task.remove_tag(tag) else {
            return WriteOutcome::Rejected(Rejection::ItemMissing);
        };
        self.publish(key, NestedChange::tags(change));
        self.persist_scoped(key, RemoteWrite::WholeTask).await
    }

    pub async fn add_sub_task(&mut self, key: TaskKey, title: &str) -> WriteOutcome {
        let Some(task) = self.task_mut(key) else {
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };
        if title.trim().is_empty() {
            return WriteOutcome::Rejected(Rejection::BlankValue);
        }
        let sub_task = SubTask::new(title.trim());
        let item = sub_task.key;
        let change = task.add_sub_task(sub_task);
        self.publish(key, NestedChange::sub_tasks(change));
        self.persist_scoped(key, RemoteWrite::AddSubTask(item)).await
    }

    pub async fn set_sub_task_completed(
        &mut self,
        key: TaskKey,
        item: ItemKey,
        completed: bool,
    ) -> WriteOutcome {
        let Some(task) = self.task_mut(key) else {
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };
        let Some(change) = task.update_sub_task(item, |s| s.is_completed = completed) else {
            return WriteOutcome::Rejected(Rejection::ItemMissing);
        };
        self.publish(key, NestedChange::sub_tasks(change));
        self.persist_scoped(key, RemoteWrite::UpdateSubTask(item)).await
    }

    pub async fn rename_sub_task(
        &mut self,
        key: TaskKey,
        item: ItemKey,
        title: &str,
    ) -> WriteOutcome {
        let Some(task) = self.task_mut(key) else {
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };
        let title = title.trim();
        if title.is_empty() {
            return WriteOutcome::Rejected(Rejection::BlankValue);
        }
        let Some(change) = task.update_sub_task(item, |s| s.title = title.to_string()) else {
            return WriteOutcome::Rejected(Rejection::ItemMissing);
        };
        self.publish(key, NestedChange::sub_tasks(change));
        self.persist_scoped(key, RemoteWrite::UpdateSubTask(item)).await
    }

    pub async fn remove_sub_task(&mut self, key: TaskKey, item: ItemKey) -> WriteOutcome {
        let Some(task) = self.task_mut(key) else {
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };
        let Some((removed, change)) = task.remove_sub_task(item) else {
            return WriteOutcome::Rejected(Rejection::ItemMissing);
        };
        self.publish(key, NestedChange::sub_tasks(change));
        self.persist_scoped(key, RemoteWrite::DeleteSubTask(removed.id)).await
    }

    pub async fn add_attachment(&mut self, key: TaskKey, attachment: Attachment) -> WriteOutcome {
        let Some(task) = self.task_mut(key) else {
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };
        if attachment.file_name.trim().is_empty() {
            return WriteOutcome::Rejected(Rejection::BlankValue);
        }
        let item = attachment.key;
        let change = task.add_attachment(attachment);
        self.publish(key, NestedChange::attachments(change));
        self.persist_scoped(key, RemoteWrite::AddAttachment(item)).await
    }

    pub async fn remove_attachment(&mut self, key: TaskKey, item: ItemKey) -> WriteOutcome {
        let Some(task) = self.task_mut(key) else {
            return WriteOutcome::Rejected(Rejection::TaskMissing);
        };
        let Some((removed, change)) = task.remove_attachment(item) else {
            return WriteOutcome::Rejected(Rejection::ItemMissing);
        };
        self.publish(key, NestedChange::attachments(change));
        self.persist_scoped(key, RemoteWrite::DeleteAttachment(removed.id)).await
    }

    // ---- Whole-collection sync ----

    /// Upload the whole in-memory collection, replacing what the backend
    /// holds, then reload it to pick up the ids the backend assigned.
    pub async fn sync_all(&mut self) -> WriteOutcome {
        let Some(remote) = &self.remote else {
            let outcome = self.save_local().await;
            return self.finish(None, outcome);
        };

        let dtos: Vec<TaskDto> = self.tasks.iter().map(TaskDto::from).collect();
        let uploaded = remote.replace_all(&dtos).await;
        let outcome = match uploaded {
            Ok(()) => {
                tracing::info!("Uploaded {} tasks to the backend", dtos.len());
                let reloaded = remote.load_all().await;
                match reloaded {
                    Ok(canonical) => {
                        let tasks = self.rebuild_from(canonical);
                        self.replace_collection(LoadSource::Remote, tasks);
                    }
                    Err(e) => self.remote_failed("load_all", &e),
                }
                WriteOutcome::PersistedRemote
            }
            Err(e) => {
                self.remote_failed("replace_all", &e);
                self.save_local().await
            }
        };
        self.finish(None, outcome)
    }

    /// Canonical tasks, keeping the local key of every task the backend
    /// already knew by id.
    fn rebuild_from(&mut self, canonical: Vec<TaskDto>) -> Vec<Task> {
        let mut known: HashMap<i64, Task> = std::mem::take(&mut self.tasks)
            .into_iter()
            .filter(Task::is_persisted_remotely)
            .map(|t| (t.id, t))
            .collect();
        canonical
            .into_iter()
            .map(|dto| match known.remove(&dto.id) {
                Some(mut task) => {
                    task.adopt_remote(dto);
                    task
                }
                None => Task::from(dto),
            })
            .collect()
    }

    // ---- Filtering ----

    pub fn filter(&self) -> &TaskFilter {
        &self.filter
    }

    pub fn set_search_text(&mut self, text: &str) {
        if self.filter.search_text != text {
            self.filter.search_text = text.to_string();
            self.filter_changed();
        }
    }

    /// Select a tag to filter by. A tag that does not exist falls back to
    /// [`TagSelection::All`].
    pub fn select_tag(&mut self, selection: TagSelection) {
        self.filter.selected_tag = selection;
        self.filter.normalize_selection(&self.tag_universe);
        self.filter_changed();
    }

    /// Tasks passing the current filter, in collection order.
    pub fn filtered_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| self.filter.matches(t))
            .collect()
    }

    pub fn tag_universe(&self) -> &[String] {
        &self.tag_universe
    }

    /// What a tag picker offers: "All" followed by every known tag.
    pub fn tag_choices(&self) -> Vec<String> {
        std::iter::once(ALL_TAGS_LABEL.to_string())
            .chain(self.tag_universe.iter().cloned())
            .collect()
    }

    fn filter_changed(&self) {
        self.events.emit(TaskEvent::FilterChanged {
            search_text: self.filter.search_text.clone(),
            selected_tag: self.filter.selected_tag.to_string(),
        });
    }

    fn refresh_tags(&mut self) {
        let universe = tag_universe(&self.tasks);
        if universe != self.tag_universe {
            self.tag_universe = universe;
            self.events.emit(TaskEvent::TagsChanged {
                tags: self.tag_universe.clone(),
            });
        }
        if self.filter.normalize_selection(&self.tag_universe) {
            self.filter_changed();
        }
    }

    // ---- Persistence plumbing ----

    fn publish(&mut self, key: TaskKey, change: NestedChange) {
        let Some(task) = self.task(key) else {
            return;
        };
        let reaction = self.bridge.publish(task, change);
        if reaction.is_some_and(|r| r.refresh_tags) {
            self.refresh_tags();
        }
    }

    /// Follow-up for a task whose nested collections were swapped out.
    fn after_replacement(&mut self, index: usize) {
        let task = &self.tasks[index];
        self.bridge.rehook(task);
        self.events.emit(TaskEvent::TaskUpdated {
            key: task.key(),
            title: task.title.clone(),
        });
        for change in NestedChange::resets_of(task) {
            self.bridge.publish(task, change);
        }
        self.refresh_tags();
    }

    fn adopt_canonical(&mut self, key: TaskKey, dto: TaskDto) {
        let Some(index) = self.index_of(key) else {
            tracing::debug!("Task {} is gone, ignoring its canonical copy", key);
            return;
        };
        self.tasks[index].adopt_remote(dto);
        self.after_replacement(index);
    }

    async fn persist_scoped(&mut self, key: TaskKey, write: RemoteWrite) -> WriteOutcome {
        let operation = write.operation();
        let outcome = match self.remote_write(key, write).await {
            Some(Ok(())) => {
                tracing::info!("Persisted task {} remotely via {}", key, operation);
                WriteOutcome::PersistedRemote
            }
            Some(Err(e)) => {
                self.remote_failed(operation, &e);
                self.save_local().await
            }
            None => self.save_local().await,
        };
        self.finish(Some(key), outcome)
    }

    /// Run the backend side of a task-scoped write. `None` means the backend
    /// does not apply: there is none, or the task has no backend id yet.
    async fn remote_write(&mut self, key: TaskKey, write: RemoteWrite) -> Option<RemoteResult<()>> {
        let remote = self.remote.as_ref()?;
        let task = self.task(key)?;
        if !task.is_persisted_remotely() {
            return None;
        }
        let task_id = task.id;

        match write.resolve(task) {
            RemoteWrite::WholeTask => {
                let updated = remote.update_task(&TaskDto::from(task)).await;
                if let Err(e) = updated {
                    return Some(Err(e));
                }
                // The backend rebuilt the nested rows; learn their new ids
                let canonical = remote.get_task(task_id).await;
                match canonical {
                    Ok(dto) => self.adopt_canonical(key, dto),
                    Err(e) => {
                        self.remote_failed("get_task", &e);
                        if let Some(task) = self.task_mut(key) {
                            task.forget_nested_ids();
                        }
                    }
                }
                Some(Ok(()))
            }
            RemoteWrite::AddTag(tag) => Some(remote.add_tag(task_id, &tag).await),
            RemoteWrite::AddSubTask(item) => {
                let dto = task.sub_task(item).map(SubTaskDto::from)?;
                let created = remote.add_sub_task(task_id, &dto).await;
                Some(created.map(|created| {
                    if let Some(task) = self.task_mut(key) {
                        task.assign_sub_task_id(item, created.id);
                    }
                }))
            }
            RemoteWrite::UpdateSubTask(item) => {
                let dto = task.sub_task(item).map(SubTaskDto::from)?;
                Some(remote.update_sub_task(task_id, &dto).await)
            }
            RemoteWrite::DeleteSubTask(id) => Some(remote.delete_sub_task(task_id, id).await),
            RemoteWrite::AddAttachment(item) => {
                let dto = task.attachment(item).map(AttachmentDto::from)?;
                let created = remote.add_attachment(task_id, &dto).await;
                Some(created.map(|created| {
                    if let Some(task) = self.task_mut(key) {
                        task.assign_attachment_id(item, created.id);
                    }
                }))
            }
            RemoteWrite::DeleteAttachment(id) => Some(remote.delete_attachment(task_id, id).await),
        }
    }

    async fn save_local(&self) -> WriteOutcome {
        match self.store.save_all(&self.tasks).await {
            Ok(()) => {
                tracing::debug!(
                    "Saved {} tasks to {}",
                    self.tasks.len(),
                    self.store.path().display()
                );
                WriteOutcome::PersistedLocalFallback
            }
            Err(e) => {
                tracing::error!("Failed to save tasks locally: {}", e);
                self.events.emit(TaskEvent::PersistFailed {
                    message: e.to_string(),
                });
                WriteOutcome::NotPersisted
            }
        }
    }

    fn remote_failed(&self, operation: &str, error: &RemoteError) {
        tracing::warn!("Remote {} failed, using local file: {}", operation, error);
        self.events.emit(TaskEvent::RemoteFailed {
            operation: operation.to_string(),
            message: error.to_string(),
        });
    }

    fn finish(&self, key: Option<TaskKey>, outcome: WriteOutcome) -> WriteOutcome {
        self.events.emit(TaskEvent::Persisted { key, outcome });
        outcome
    }
}
