#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use devourer_client::{EventDispatcher, JsonFileStore, SyncCoordinator, TaskEvent, TaskRemote};
use devourer_core::{AttachmentDto, RemoteError, RemoteResult, SubTaskDto, TaskDto};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::TempDir;

pub fn due(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// A store in a fresh scratch directory. Keep the `TempDir` alive.
pub fn scratch_store() -> (TempDir, JsonFileStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("tasks.json"));
    (dir, store)
}

pub fn record_events(dispatcher: &EventDispatcher) -> Arc<Mutex<Vec<TaskEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    dispatcher
        .register_callback(move |event| seen_clone.lock().unwrap().push(event))
        .unwrap();
    seen
}

/// Deliver queued events and hand back everything recorded so far.
pub fn drain<R: TaskRemote>(
    coordinator: &SyncCoordinator<R>,
    seen: &Arc<Mutex<Vec<TaskEvent>>>,
) -> Vec<TaskEvent> {
    coordinator.events().process_events().unwrap();
    std::mem::take(&mut *seen.lock().unwrap())
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    pub tasks: Vec<TaskDto>,
    pub next_id: i64,
    pub offline: bool,
    pub failing: HashSet<&'static str>,
    pub calls: Vec<&'static str>,
}

impl FakeBackend {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Store a task the way the real backend does: fresh rows for every
    /// nested item.
    fn store(&mut self, mut dto: TaskDto) -> TaskDto {
        if dto.id <= 0 {
            dto.id = self.assign_id();
        }
        for sub in &mut dto.sub_tasks {
            sub.id = self.assign_id();
        }
        for att in &mut dto.attachments {
            att.id = self.assign_id();
        }
        dto
    }

    fn task_mut(&mut self, id: i64, path: &str) -> RemoteResult<&mut TaskDto> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                path: path.to_string(),
            })
    }
}

/// In-memory [`TaskRemote`] with switches for failing calls.
#[derive(Debug, Clone, Default)]
pub struct FakeRemote {
    pub state: Arc<Mutex<FakeBackend>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn fail(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn stored(&self) -> Vec<TaskDto> {
        self.state.lock().unwrap().tasks.clone()
    }

    pub fn seed(&self, dto: TaskDto) -> TaskDto {
        let mut state = self.state.lock().unwrap();
        let stored = state.store(dto);
        state.tasks.push(stored.clone());
        stored
    }

    fn begin(&self, operation: &'static str) -> RemoteResult<MutexGuard<'_, FakeBackend>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation);
        if state.offline || state.failing.contains(operation) {
            return Err(RemoteError::Unreachable(format!("{operation}: backend offline")));
        }
        Ok(state)
    }
}

fn require_id(id: i64) -> RemoteResult<i64> {
    if id > 0 {
        Ok(id)
    } else {
        Err(RemoteError::NotPersisted(id))
    }
}

impl TaskRemote for FakeRemote {
    async fn load_all(&self) -> RemoteResult<Vec<TaskDto>> {
        let state = self.begin("load_all")?;
        Ok(state.tasks.clone())
    }

    async fn get_task(&self, id: i64) -> RemoteResult<TaskDto> {
        let mut state = self.begin("get_task")?;
        state.task_mut(id, "api/tasks/{id}").map(|t| t.clone())
    }

    async fn create_task(&self, task: &TaskDto) -> RemoteResult<TaskDto> {
        let mut state = self.begin("create_task")?;
        let mut dto = task.clone();
        dto.id = 0;
        let stored = state.store(dto);
        state.tasks.push(stored.clone());
        Ok(stored)
    }

    async fn update_task(&self, task: &TaskDto) -> RemoteResult<()> {
        let mut state = self.begin("update_task")?;
        let id = require_id(task.id)?;
        let stored = state.store(task.clone());
        *state.task_mut(id, "api/tasks/{id}")? = stored;
        Ok(())
    }

    async fn delete_task(&self, id: i64) -> RemoteResult<()> {
        let mut state = self.begin("delete_task")?;
        let id = require_id(id)?;
        state.task_mut(id, "api/tasks/{id}")?;
        state.tasks.retain(|t| t.id != id);
        Ok(())
    }

    async fn add_sub_task(&self, task_id: i64, sub_task: &SubTaskDto) -> RemoteResult<SubTaskDto> {
        let mut state = self.begin("add_sub_task")?;
        let task_id = require_id(task_id)?;
        let mut created = sub_task.clone();
        created.id = state.assign_id();
        state
            .task_mut(task_id, "api/tasks/{id}/subtasks")?
            .sub_tasks
            .push(created.clone());
        Ok(created)
    }

    async fn update_sub_task(&self, task_id: i64, sub_task: &SubTaskDto) -> RemoteResult<()> {
        let mut state = self.begin("update_sub_task")?;
        let task = state.task_mut(require_id(task_id)?, "api/tasks/{id}/subtasks/{subId}")?;
        let stored = task
            .sub_tasks
            .iter_mut()
            .find(|s| s.id == sub_task.id)
            .ok_or(RemoteError::NotPersisted(sub_task.id))?;
        *stored = sub_task.clone();
        Ok(())
    }

    async fn delete_sub_task(&self, task_id: i64, sub_task_id: i64) -> RemoteResult<()> {
        let mut state = self.begin("delete_sub_task")?;
        let task = state.task_mut(require_id(task_id)?, "api/tasks/{id}/subtasks/{subId}")?;
        task.sub_tasks.retain(|s| s.id != sub_task_id);
        Ok(())
    }

    async fn add_tag(&self, task_id: i64, tag: &str) -> RemoteResult<()> {
        let mut state = self.begin("add_tag")?;
        let task = state.task_mut(require_id(task_id)?, "api/tasks/{id}/tags")?;
        task.tags.push(tag.to_string());
        Ok(())
    }

    async fn delete_tag(&self, task_id: i64, _tag_id: i64) -> RemoteResult<()> {
        let mut state = self.begin("delete_tag")?;
        state.task_mut(require_id(task_id)?, "api/tasks/{id}/tags/{tagId}")?;
        Ok(())
    }

    async fn add_attachment(
        &self,
        task_id: i64,
        attachment: &AttachmentDto,
    ) -> RemoteResult<AttachmentDto> {
        let mut state = self.begin("add_attachment")?;
        let task_id = require_id(task_id)?;
        let mut created = attachment.clone();
        created.id = state.assign_id();
        state
            .task_mut(task_id, "api/tasks/{id}/attachments")?
            .attachments
            .push(created.clone());
        Ok(created)
    }

    async fn delete_attachment(&self, task_id: i64, attachment_id: i64) -> RemoteResult<()> {
        let mut state = self.begin("delete_attachment")?;
        let task = state.task_mut(require_id(task_id)?, "api/tasks/{id}/attachments/{attId}")?;
        task.attachments.retain(|a| a.id != attachment_id);
        Ok(())
    }

    async fn replace_all(&self, tasks: &[TaskDto]) -> RemoteResult<()> {
        let mut state = self.begin("replace_all")?;
        let stored: Vec<TaskDto> = tasks.iter().cloned().map(|t| state.store(t)).collect();
        state.tasks = stored;
        Ok(())
    }
}
