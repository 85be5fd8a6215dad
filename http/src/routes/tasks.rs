// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prismq_store::StoreError;
use utoipa::OpenApi;

use crate::{
    error::{HttpError, HttpResult},
    models::TaskResponse,
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/queue/tasks/{id}",
    tag = "Queue",
    params(("id" = i64, Path, description = "task id")),
    responses(
        (status = 200, description = "task found", body = TaskResponse),
        (status = 404, description = "no task with that id"),
    )
)]
/// Fetch a task by id
async fn get_task_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HttpResult<impl IntoResponse> {
    let task = state.store.get_task(id)?.ok_or(HttpError::NotFound(id))?;
    Ok(Json(TaskResponse::from(task)))
}

#[utoipa::path(
    post,
    path = "/queue/tasks/{id}/cancel",
    tag = "Queue",
    params(("id" = i64, Path, description = "task id")),
    responses(
        (status = 200, description = "task cancelled", body = TaskResponse),
        (status = 404, description = "no task with that id"),
        (status = 409, description = "task already in a terminal state"),
    )
)]
/// Cancel a task that hasn't reached a terminal state yet
async fn cancel_task_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HttpResult<impl IntoResponse> {
    let task = state.store.cancel_task(id).map_err(|err| match err {
        StoreError::NotFound(id) => HttpError::NotFound(id),
        StoreError::InvalidTransition { task_id, .. } => HttpError::AlreadyTerminal(task_id),
        other => HttpError::Store(other),
    })?;
    Ok(Json(TaskResponse::from(task)))
}

#[derive(OpenApi)]
#[openapi(
    paths(get_task_handler, cancel_task_handler),
    components(schemas(TaskResponse))
)]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_task_handler))
        .route("/:id/cancel", post(cancel_task_handler))
}
