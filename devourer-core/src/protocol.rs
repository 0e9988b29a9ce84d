//! Wire shapes exchanged with the REST backend.
//!
//! The backend speaks camelCase JSON; the local task file uses the model's
//! PascalCase names instead, so the two representations are kept apart.

use crate::models::{due_date_format, Attachment, SubTask, Task};
use crate::observable::ObservableVec;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "due_date_format")]
    pub due_date: NaiveDateTime,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sub_tasks: Vec<SubTaskDto>,
    #[serde(default)]
    pub attachments: Vec<AttachmentDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTaskDto {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDto {
    #[serde(default)]
    pub id: i64,
    pub file_name: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub size_bytes: i64,
}

impl From<&SubTask> for SubTaskDto {
    fn from(sub: &SubTask) -> Self {
        Self {
            id: sub.id,
            title: sub.title.clone(),
            is_completed: sub.is_completed,
        }
    }
}

impl From<SubTaskDto> for SubTask {
    fn from(dto: SubTaskDto) -> Self {
        let mut sub = SubTask::new(dto.title);
        sub.id = dto.id;
        sub.is_completed = dto.is_completed;
        sub
    }
}

impl From<&Attachment> for AttachmentDto {
    fn from(att: &Attachment) -> Self {
        Self {
            id: att.id,
            file_name: att.file_name.clone(),
            file_path: att.file_path.clone(),
            size_bytes: att.size_bytes,
        }
    }
}

impl From<AttachmentDto> for Attachment {
    fn from(dto: AttachmentDto) -> Self {
        let mut att = Attachment::new(dto.file_name, dto.file_path, dto.size_bytes);
        att.id = dto.id;
        att
    }
}

impl From<&Task> for TaskDto {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            due_date: task.due_date,
            is_completed: task.is_completed(),
            tags: task.tags().to_vec(),
            sub_tasks: task.sub_tasks().iter().map(SubTaskDto::from).collect(),
            attachments: task.attachments().iter().map(AttachmentDto::from).collect(),
        }
    }
}

impl From<TaskDto> for Task {
    fn from(dto: TaskDto) -> Self {
        let mut task = Task::new(dto.title.clone(), dto.description.clone(), dto.due_date);
        task.adopt_remote(dto);
        task
    }
}

impl Task {
    /// Take over the backend's canonical copy while keeping this task's
    /// local key. Nested collections are replaced wholesale.
    pub fn adopt_remote(&mut self, dto: TaskDto) {
        self.id = dto.id;
        self.title = dto.title;
        self.description = dto.description;
        self.due_date = dto.due_date;
        // The backend's flag is authoritative; the completed tag arrives
        // with the tag list.
        self.restore_completed(dto.is_completed);
        self.replace_nested(
            ObservableVec::from(dto.tags),
            dto.sub_tasks.into_iter().map(SubTask::from).collect(),
            dto.attachments.into_iter().map(Attachment::from).collect(),
        );
    }
}
