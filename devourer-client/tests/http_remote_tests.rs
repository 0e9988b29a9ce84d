mod common;

use axum::{
    extract::{Path, State},
    http::{header::ACCEPT, HeaderMap, StatusCode},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use common::due;
use devourer_client::{
    ClientConfig, HttpTaskRemote, LoadSource, SyncCoordinator, TaskRemote, WriteOutcome,
};
use devourer_core::{AttachmentDto, RemoteError, SubTaskDto, TaskDto};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockBackend {
    tasks: Vec<TaskDto>,
    next_id: i64,
    requests: Vec<String>,
    accept: Vec<String>,
}

impl MockBackend {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

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

    fn task_mut(&mut self, id: i64) -> Result<&mut TaskDto, StatusCode> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StatusCode::NOT_FOUND)
    }
}

type Shared = Arc<Mutex<MockBackend>>;

fn log(state: &Shared, request: String) {
    state.lock().unwrap().requests.push(request);
}

async fn list_tasks(State(state): State<Shared>, headers: HeaderMap) -> Json<Vec<TaskDto>> {
    let mut backend = state.lock().unwrap();
    backend.requests.push("GET api/tasks".into());
    if let Some(accept) = headers.get(ACCEPT).and_then(|v| v.to_str().ok()) {
        backend.accept.push(accept.to_string());
    }
    Json(backend.tasks.clone())
}

async fn create_task(
    State(state): State<Shared>,
    Json(dto): Json<TaskDto>,
) -> (StatusCode, Json<TaskDto>) {
    log(&state, "POST api/tasks".into());
    let mut backend = state.lock().unwrap();
    let stored = backend.store(TaskDto { id: 0, ..dto });
    backend.tasks.push(stored.clone());
    (StatusCode::CREATED, Json(stored))
}

async fn get_task(
    State(state): State<Shared>,
    Path(id): Path<i64>,
) -> Result<Json<TaskDto>, StatusCode> {
    log(&state, format!("GET api/tasks/{id}"));
    let mut backend = state.lock().unwrap();
    backend.task_mut(id).map(|t| Json(t.clone()))
}

async fn update_task(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    Json(dto): Json<TaskDto>,
) -> StatusCode {
    log(&state, format!("PUT api/tasks/{id}"));
    let mut backend = state.lock().unwrap();
    let stored = backend.store(TaskDto { id, ..dto });
    match backend.task_mut(id) {
        Ok(task) => {
            *task = stored;
            StatusCode::NO_CONTENT
        }
        Err(status) => status,
    }
}

async fn delete_task(State(state): State<Shared>, Path(id): Path<i64>) -> StatusCode {
    log(&state, format!("DELETE api/tasks/{id}"));
    let mut backend = state.lock().unwrap();
    let before = backend.tasks.len();
    backend.tasks.retain(|t| t.id != id);
    if backend.tasks.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn replace_all(State(state): State<Shared>, Json(tasks): Json<Vec<TaskDto>>) -> StatusCode {
    log(&state, "PUT api/tasks/sync".into());
    let mut backend = state.lock().unwrap();
    let stored: Vec<TaskDto> = tasks.into_iter().map(|t| backend.store(t)).collect();
    backend.tasks = stored;
    StatusCode::NO_CONTENT
}

async fn add_sub_task(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    Json(dto): Json<SubTaskDto>,
) -> Result<Json<SubTaskDto>, StatusCode> {
    log(&state, format!("POST api/tasks/{id}/subtasks"));
    let mut backend = state.lock().unwrap();
    let created = SubTaskDto {
        id: backend.assign_id(),
        ..dto
    };
    backend.task_mut(id)?.sub_tasks.push(created.clone());
    Ok(Json(created))
}

async fn update_sub_task(
    State(state): State<Shared>,
    Path((id, sub_id)): Path<(i64, i64)>,
    Json(dto): Json<SubTaskDto>,
) -> StatusCode {
    log(&state, format!("PATCH api/tasks/{id}/subtasks/{sub_id}"));
    let mut backend = state.lock().unwrap();
    let Ok(task) = backend.task_mut(id) else {
        return StatusCode::NOT_FOUND;
    };
    match task.sub_tasks.iter_mut().find(|s| s.id == sub_id) {
        Some(sub) => {
            *sub = dto;
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn delete_sub_task(
    State(state): State<Shared>,
    Path((id, sub_id)): Path<(i64, i64)>,
) -> StatusCode {
    log(&state, format!("DELETE api/tasks/{id}/subtasks/{sub_id}"));
    let mut backend = state.lock().unwrap();
    match backend.task_mut(id) {
        Ok(task) => {
            task.sub_tasks.retain(|s| s.id != sub_id);
            StatusCode::NO_CONTENT
        }
        Err(status) => status,
    }
}

async fn add_tag(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    Json(tag): Json<String>,
) -> StatusCode {
    log(&state, format!("POST api/tasks/{id}/tags"));
    let mut backend = state.lock().unwrap();
    match backend.task_mut(id) {
        Ok(task) => {
            task.tags.push(tag);
            StatusCode::CREATED
        }
        Err(status) => status,
    }
}

async fn delete_tag(
    State(state): State<Shared>,
    Path((id, tag_id)): Path<(i64, i64)>,
) -> StatusCode {
    log(&state, format!("DELETE api/tasks/{id}/tags/{tag_id}"));
    StatusCode::NO_CONTENT
}

async fn add_attachment(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    Json(dto): Json<AttachmentDto>,
) -> Result<Json<AttachmentDto>, StatusCode> {
    log(&state, format!("POST api/tasks/{id}/attachments"));
    let mut backend = state.lock().unwrap();
    let created = AttachmentDto {
        id: backend.assign_id(),
        ..dto
    };
    backend.task_mut(id)?.attachments.push(created.clone());
    Ok(Json(created))
}

async fn delete_attachment(
    State(state): State<Shared>,
    Path((id, att_id)): Path<(i64, i64)>,
) -> StatusCode {
    log(&state, format!("DELETE api/tasks/{id}/attachments/{att_id}"));
    let mut backend = state.lock().unwrap();
    match backend.task_mut(id) {
        Ok(task) => {
            task.attachments.retain(|a| a.id != att_id);
            StatusCode::NO_CONTENT
        }
        Err(status) => status,
    }
}

fn mock_router(state: Shared) -> Router {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/sync", put(replace_all))
        .route(
            "/api/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/:id/subtasks", post(add_sub_task))
        .route(
            "/api/tasks/:id/subtasks/:sub_id",
            patch(update_sub_task).delete(delete_sub_task),
        )
        .route("/api/tasks/:id/tags", post(add_tag))
        .route("/api/tasks/:id/tags/:tag_id", delete(delete_tag))
        .route("/api/tasks/:id/attachments", post(add_attachment))
        .route("/api/tasks/:id/attachments/:att_id", delete(delete_attachment))
        .with_state(state)
}

/// Serve `app` on an ephemeral port and return its base URL.
async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

async fn start_mock() -> (String, Shared) {
    let state = Shared::default();
    let url = spawn_server(mock_router(state.clone())).await;
    (url, state)
}

fn remote(url: &str) -> HttpTaskRemote {
    HttpTaskRemote::new(url, Duration::from_secs(2)).unwrap()
}

fn dto(title: &str) -> TaskDto {
    TaskDto {
        id: 0,
        title: title.into(),
        description: String::new(),
        due_date: due(2025, 4, 1),
        is_completed: false,
        tags: vec!["finance".into()],
        sub_tasks: vec![SubTaskDto {
            id: 0,
            title: "transfer".into(),
            is_completed: false,
        }],
        attachments: vec![],
    }
}

#[tokio::test]
async fn test_task_endpoints() {
    let (url, state) = start_mock().await;
    let remote = remote(&url);

    let created = remote.create_task(&dto("Pay rent")).await.unwrap();
    assert!(created.id > 0);
    assert!(created.sub_tasks[0].id > 0);

    let all = remote.load_all().await.unwrap();
    assert_eq!(all, vec![created.clone()]);

    let mut changed = created.clone();
    changed.title = "Pay rent early".into();
    remote.update_task(&changed).await.unwrap();
    let fetched = remote.get_task(created.id).await.unwrap();
    assert_eq!(fetched.title, "Pay rent early");
    // The update rebuilt the nested rows
    assert_ne!(fetched.sub_tasks[0].id, created.sub_tasks[0].id);

    remote.delete_task(created.id).await.unwrap();
    assert!(remote.load_all().await.unwrap().is_empty());

    let backend = state.lock().unwrap();
    assert_eq!(
        backend.requests,
        vec![
            "POST api/tasks".to_string(),
            "GET api/tasks".into(),
            format!("PUT api/tasks/{}", created.id),
            format!("GET api/tasks/{}", created.id),
            format!("DELETE api/tasks/{}", created.id),
            "GET api/tasks".into(),
        ]
    );
    assert!(backend.accept.iter().all(|a| a == "application/json"));
}

#[tokio::test]
async fn test_nested_endpoints() {
    let (url, state) = start_mock().await;
    let remote = remote(&url);
    let task = remote.create_task(&dto("Groceries")).await.unwrap();

    let sub = remote
        .add_sub_task(
            task.id,
            &SubTaskDto {
                id: 0,
                title: "milk".into(),
                is_completed: false,
            },
        )
        .await
        .unwrap();
    assert!(sub.id > 0);
    remote
        .update_sub_task(
            task.id,
            &SubTaskDto {
                is_completed: true,
                ..sub.clone()
            },
        )
        .await
        .unwrap();
    remote.add_tag(task.id, "home").await.unwrap();
    let att = remote
        .add_attachment(
            task.id,
            &AttachmentDto {
                id: 0,
                file_name: "list.txt".into(),
                file_path: None,
                size_bytes: 10,
            },
        )
        .await
        .unwrap();

    let stored = remote.get_task(task.id).await.unwrap();
    assert_eq!(stored.tags, vec!["finance".to_string(), "home".into()]);
    assert!(stored.sub_tasks.iter().any(|s| s.id == sub.id && s.is_completed));
    assert_eq!(stored.attachments[0].id, att.id);

    remote.delete_sub_task(task.id, sub.id).await.unwrap();
    remote.delete_attachment(task.id, att.id).await.unwrap();
    remote.delete_tag(task.id, 1).await.unwrap();
    let stored = remote.get_task(task.id).await.unwrap();
    assert!(!stored.sub_tasks.iter().any(|s| s.id == sub.id));
    assert!(stored.attachments.is_empty());

    let requests = state.lock().unwrap().requests.clone();
    assert!(requests.contains(&format!("PATCH api/tasks/{}/subtasks/{}", task.id, sub.id)));
    assert!(requests.contains(&format!("POST api/tasks/{}/tags", task.id)));
    assert!(requests.contains(&format!("DELETE api/tasks/{}/tags/1", task.id)));
}

#[tokio::test]
async fn test_replace_all() {
    let (url, state) = start_mock().await;
    let remote = remote(&url);
    remote.create_task(&dto("old")).await.unwrap();

    remote
        .replace_all(&[dto("Pay rent"), dto("Buy milk")])
        .await
        .unwrap();
    let titles: Vec<String> = remote
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(titles, vec!["Pay rent", "Buy milk"]);
    assert!(state
        .lock()
        .unwrap()
        .requests
        .contains(&"PUT api/tasks/sync".to_string()));
}

#[tokio::test]
async fn test_missing_task_is_a_status_error() {
    let (url, _state) = start_mock().await;
    let err = remote(&url).get_task(41).await.unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_server_error_status() {
    let app = Router::new().route(
        "/api/tasks",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let url = spawn_server(app).await;
    let err = remote(&url).load_all().await.unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let app = Router::new().route("/api/tasks", get(|| async { "definitely not json" }));
    let url = spawn_server(app).await;
    let err = remote(&url).load_all().await.unwrap_err();
    assert!(matches!(err, RemoteError::Decode { .. }));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let app = Router::new().route(
        "/api/tasks",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(Vec::<TaskDto>::new())
        }),
    );
    let url = spawn_server(app).await;
    let remote = HttpTaskRemote::new(&url, Duration::from_millis(200)).unwrap();
    let err = remote.load_all().await.unwrap_err();
    assert!(matches!(err, RemoteError::Timeout { .. }));
}

#[tokio::test]
async fn test_unreachable_backend() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = remote(&format!("http://{addr}/"))
        .load_all()
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Unreachable(_)));
}

#[tokio::test]
async fn test_coordinator_over_http() {
    let (url, state) = start_mock().await;
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig {
        api_base_url: Some(url),
        data_file: dir.path().join("tasks.json"),
        ..ClientConfig::default()
    };
    let mut coordinator = SyncCoordinator::from_config(&config).unwrap();
    assert!(coordinator.has_remote());

    let report = coordinator.initialize().await;
    assert_eq!(report.source, LoadSource::Remote);

    let outcome = coordinator.add_task("Pay rent", "", due(2025, 4, 1)).await;
    assert_eq!(outcome, WriteOutcome::PersistedRemote);
    let key = coordinator.tasks()[0].key();
    coordinator.add_sub_task(key, "transfer").await;

    let mut session = coordinator.begin_edit(key).unwrap();
    session.set_description("before the 1st");
    assert_eq!(
        coordinator.commit_edit(session).await,
        WriteOutcome::PersistedRemote
    );

    let task = coordinator.task(key).unwrap();
    let stored = state.lock().unwrap().tasks[0].clone();
    assert_eq!(stored.description, "before the 1st");
    assert_eq!(task.sub_tasks()[0].id, stored.sub_tasks[0].id);
    assert!(!dir.path().join("tasks.json").exists());
}
