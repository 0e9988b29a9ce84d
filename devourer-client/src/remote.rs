//! The REST backend as seen by the coordinator.
//!
//! Calls are one-shot: no retries, a short timeout, and every failure comes
//! back as a [`RemoteError`] for the caller to fall back on.

use devourer_core::{AttachmentDto, RemoteError, RemoteResult, SubTaskDto, TaskDto};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

/// Operations the coordinator needs from a task backend.
///
/// Writes addressed to a task (or nested item) that has no backend id yet
/// fail with [`RemoteError::NotPersisted`] without touching the network.
pub trait TaskRemote: Send + Sync {
    fn load_all(&self) -> impl Future<Output = RemoteResult<Vec<TaskDto>>> + Send;

    fn get_task(&self, id: i64) -> impl Future<Output = RemoteResult<TaskDto>> + Send;

    /// Returns the stored task with its assigned id.
    fn create_task(&self, task: &TaskDto) -> impl Future<Output = RemoteResult<TaskDto>> + Send;

    /// Whole overwrite. The backend regenerates nested item ids.
    fn update_task(&self, task: &TaskDto) -> impl Future<Output = RemoteResult<()>> + Send;

    fn delete_task(&self, id: i64) -> impl Future<Output = RemoteResult<()>> + Send;

    fn add_sub_task(
        &self,
        task_id: i64,
        sub_task: &SubTaskDto,
    ) -> impl Future<Output = RemoteResult<SubTaskDto>> + Send;

    fn update_sub_task(
        &self,
        task_id: i64,
        sub_task: &SubTaskDto,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    fn delete_sub_task(
        &self,
        task_id: i64,
        sub_task_id: i64,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    fn add_tag(&self, task_id: i64, tag: &str) -> impl Future<Output = RemoteResult<()>> + Send;

    fn delete_tag(&self, task_id: i64, tag_id: i64)
        -> impl Future<Output = RemoteResult<()>> + Send;

    fn add_attachment(
        &self,
        task_id: i64,
        attachment: &AttachmentDto,
    ) -> impl Future<Output = RemoteResult<AttachmentDto>> + Send;

    fn delete_attachment(
        &self,
        task_id: i64,
        attachment_id: i64,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Replace everything the backend holds with `tasks`.
    fn replace_all(&self, tasks: &[TaskDto]) -> impl Future<Output = RemoteResult<()>> + Send;
}

fn require_id(id: i64) -> RemoteResult<i64> {
    if id > 0 {
        Ok(id)
    } else {
        Err(RemoteError::NotPersisted(id))
    }
}

/// [`TaskRemote`] over HTTP + JSON.
#[derive(Debug, Clone)]
pub struct HttpTaskRemote {
    client: Client,
    base_url: Url,
}

impl HttpTaskRemote {
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{base_url}: {e}")))?;
        // Url::join drops the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::Unreachable(format!("HTTP client setup failed: {e}")))?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> RemoteResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RemoteError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> RemoteResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, path))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{path} answered {status}");
            return Err(RemoteError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> RemoteResult<T> {
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout {
                    path: path.to_string(),
                }
            } else {
                RemoteError::Decode {
                    path: path.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<T> {
        let request = self.client.get(self.url(path)?);
        let response = self.send(request, path).await?;
        Self::decode(response, path).await
    }

    async fn delete(&self, path: &str) -> RemoteResult<()> {
        let request = self.client.delete(self.url(path)?);
        self.send(request, path).await.map(|_| ())
    }
}

fn transport_error(error: reqwest::Error, path: &str) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout {
            path: path.to_string(),
        }
    } else {
        RemoteError::Unreachable(format!("{path}: {error}"))
    }
}

impl TaskRemote for HttpTaskRemote {
    async fn load_all(&self) -> RemoteResult<Vec<TaskDto>> {
        self.get_json("api/tasks").await
    }

    async fn get_task(&self, id: i64) -> RemoteResult<TaskDto> {
        let id = require_id(id)?;
        self.get_json(&format!("api/tasks/{id}")).await
    }

    async fn create_task(&self, task: &TaskDto) -> RemoteResult<TaskDto> {
        let path = "api/tasks";
        let request = self.client.post(self.url(path)?).json(task);
        let response = self.send(request, path).await?;
        Self::decode(response, path).await
    }

    async fn update_task(&self, task: &TaskDto) -> RemoteResult<()> {
        let id = require_id(task.id)?;
        let path = format!("api/tasks/{id}");
        let request = self.client.put(self.url(&path)?).json(task);
        self.send(request, &path).await.map(|_| ())
    }

    async fn delete_task(&self, id: i64) -> RemoteResult<()> {
        let id = require_id(id)?;
        self.delete(&format!("api/tasks/{id}")).await
    }

    async fn add_sub_task(&self, task_id: i64, sub_task: &SubTaskDto) -> RemoteResult<SubTaskDto> {
        let task_id = require_id(task_id)?;
        let path = format!("api/tasks/{task_id}/subtasks");
        let request = self.client.post(self.url(&path)?).json(sub_task);
        let response = self.send(request, &path).await?;
        Self::decode(response, &path).await
    }

    async fn update_sub_task(&self, task_id: i64, sub_task: &SubTaskDto) -> RemoteResult<()> {
        let task_id = require_id(task_id)?;
        let sub_id = require_id(sub_task.id)?;
        let path = format!("api/tasks/{task_id}/subtasks/{sub_id}");
        let request = self.client.patch(self.url(&path)?).json(sub_task);
        self.send(request, &path).await.map(|_| ())
    }

    async fn delete_sub_task(&self, task_id: i64, sub_task_id: i64) -> RemoteResult<()> {
        let task_id = require_id(task_id)?;
        let sub_id = require_id(sub_task_id)?;
        self.delete(&format!("api/tasks/{task_id}/subtasks/{sub_id}"))
            .await
    }

    async fn add_tag(&self, task_id: i64, tag: &str) -> RemoteResult<()> {
        let task_id = require_id(task_id)?;
        let path = format!("api/tasks/{task_id}/tags");
        let request = self.client.post(self.url(&path)?).json(&tag);
        self.send(request, &path).await.map(|_| ())
    }

    async fn delete_tag(&self, task_id: i64, tag_id: i64) -> RemoteResult<()> {
        let task_id = require_id(task_id)?;
        let tag_id = require_id(tag_id)?;
        self.delete(&format!("api/tasks/{task_id}/tags/{tag_id}"))
            .await
    }

    async fn add_attachment(
        &self,
        task_id: i64,
        attachment: &AttachmentDto,
    ) -> RemoteResult<AttachmentDto> {
        let task_id = require_id(task_id)?;
        let path = format!("api/tasks/{task_id}/attachments");
        let request = self.client.post(self.url(&path)?).json(attachment);
        let response = self.send(request, &path).await?;
        Self::decode(response, &path).await
    }

    async fn delete_attachment(&self, task_id: i64, attachment_id: i64) -> RemoteResult<()> {
        let task_id = require_id(task_id)?;
        let attachment_id = require_id(attachment_id)?;
        self.delete(&format!("api/tasks/{task_id}/attachments/{attachment_id}"))
            .await
    }

    async fn replace_all(&self, tasks: &[TaskDto]) -> RemoteResult<()> {
        let path = "api/tasks/sync";
        let request = self.client.put(self.url(path)?).json(tasks);
        self.send(request, path).await.map(|_| ())
    }
}
