use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use super::models::{CreateTaskRequest, CreateTaskResponse, DrainResponse, ListQuery};
use super::state::AppState;
use crate::api::error::ApiError;
use crate::task::Task;

/// Liveness probe (GET /healthz).
pub async fn health() -> &'static str {
    "ok"
}

/// Latches the dispatcher's drain on (POST /admin/drain). Queued jobs stop
/// flowing to workers; intake keeps accepting and in-flight downloads
/// finish.
pub async fn drain(State(state): State<AppState>) -> Json<DrainResponse> {
    state.coordinator.set_drain(true);
    Json(DrainResponse { drain: true })
}

/// Releases the drain latch (POST /admin/resume).
pub async fn resume(State(state): State<AppState>) -> Json<DrainResponse> {
    state.coordinator.set_drain(false);
    Json(DrainResponse { drain: false })
}

/// Task submission endpoint (POST /tasks).
///
/// Body: `{"links": [...], "label": "...", "dest_dir": "..."}`.
/// The body is deserialized manually so malformed JSON maps to 400 rather
/// than the extractor's default 422. Validation failures (empty links,
/// unparseable URL, URL without scheme or host) are 400 as well.
pub async fn create_task(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: CreateTaskRequest = serde_json::from_slice(&body)?;

    let task = Task::new(
        &request.label,
        &request.dest_dir,
        &request.links,
        state.config.fetch.retries.max(1),
    )
    .map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

    let task_id = task.id.clone();
    state.coordinator.add_task(task).await;

    Ok(Json(CreateTaskResponse { task_id }))
}

/// Task listing endpoint (GET /tasks) with `limit`/`offset` pagination.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = parse_non_negative(query.limit.as_deref(), "limit", 100)?;
    let offset = parse_non_negative(query.offset.as_deref(), "offset", 0)?;

    let tasks = state.coordinator.list_tasks().await;
    let start = offset.min(tasks.len());
    let end = start.saturating_add(limit).min(tasks.len());

    Ok(Json(tasks[start..end].to_vec()))
}

/// Single-task snapshot endpoint (GET /tasks/{id}).
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if id.is_empty() || id.contains('/') {
        return Err(ApiError::InvalidPayload("bad task id".to_string()));
    }

    let task = state
        .coordinator
        .get_task(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("task {id}")))?;

    Ok(Json(task))
}

/// Parses an optional query value as a non-negative integer, falling back
/// to `default` when absent.
fn parse_non_negative(
    value: Option<&str>,
    key: &str,
    default: usize,
) -> Result<usize, ApiError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse::<usize>().map_err(|_| {
            ApiError::InvalidPayload(format!("{key} must be a non-negative integer"))
        }),
    }
}
