//! API request/response models.
//!
//! Task snapshots returned by the status endpoints are the
//! [`crate::task::Task`] structure serialized directly; these types cover
//! the remaining request and response bodies.

use serde::{Deserialize, Serialize};

/// Body of `POST /tasks`.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub links: Vec<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub dest_dir: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub task_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DrainResponse {
    pub drain: bool,
}

/// Pagination for `GET /tasks`; raw strings so malformed values map to 400.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}
