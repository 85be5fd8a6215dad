// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use chrono::Utc;
use prismq_store::NewTask;
use utoipa::OpenApi;

use crate::{
    error::{HttpError, HttpResult},
    models::{EnqueueRequest, TaskResponse},
    state::AppState,
};

#[utoipa::path(
    post,
    path = "/queue/enqueue",
    tag = "Queue",
    request_body = EnqueueRequest,
    responses(
        (status = 201, description = "task created", body = TaskResponse),
        (status = 200, description = "existing task returned for a colliding idempotency_key", body = TaskResponse),
        (status = 400, description = "validation error"),
    )
)]
/// Enqueue a task
async fn enqueue_handler(
    State(state): State<AppState>,
    Json(body): Json<EnqueueRequest>,
) -> HttpResult<impl IntoResponse> {
    if body.task_type.trim().is_empty() {
        return Err(HttpError::Validation("type must not be empty".into()));
    }
    if let Some(priority) = body.priority {
        if priority < 0 {
            return Err(HttpError::Validation("priority must be >= 0".into()));
        }
    }
    if let Some(max_attempts) = body.max_attempts {
        if max_attempts < 1 {
            return Err(HttpError::Validation("max_attempts must be >= 1".into()));
        }
    }

    let new_task = NewTask {
        task_type: body.task_type,
        priority: body.priority.unwrap_or(100),
        payload: body.payload,
        compatibility: body.compatibility.unwrap_or(serde_json::json!({})),
        max_attempts: body.max_attempts.unwrap_or(3),
        run_after_utc: body.run_after_utc.unwrap_or_else(Utc::now),
        idempotency_key: body.idempotency_key,
        client_id: body.client_id,
    };

    let task_type_label = new_task.task_type.clone();
    let outcome = state.store.enqueue(new_task)?;

    let status = if outcome.was_inserted() {
        crate::metrics::TASKS_ENQUEUED
            .with_label_values(&[&task_type_label])
            .inc();
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(TaskResponse::from(outcome.into_task()))))
}

#[derive(OpenApi)]
#[openapi(
    paths(enqueue_handler),
    components(schemas(EnqueueRequest, TaskResponse))
)]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", post(enqueue_handler))
}
