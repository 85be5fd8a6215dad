// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Request/response bodies for the HTTP surface. Kept separate from
//! `prismq_store::Task` so the wire shape can evolve independently of the
//! row layout.

use chrono::{DateTime, Utc};
use prismq_store::{QueueDepth, QueueDepthByType, SuccessRate, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EnqueueRequest {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub payload: Value,
    pub priority: Option<i32>,
    #[serde(default)]
    pub compatibility: Option<Value>,
    pub max_attempts: Option<i32>,
    pub idempotency_key: Option<String>,
    pub run_after_utc: Option<DateTime<Utc>>,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub task_type: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub cancel_requested: bool,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub started_utc: Option<DateTime<Utc>>,
    pub finished_utc: Option<DateTime<Utc>>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        TaskResponse {
            id: task.id,
            task_type: task.task_type,
            status: task.status,
            priority: task.priority,
            attempts: task.attempts,
            max_attempts: task.max_attempts,
            cancel_requested: task.cancel_requested,
            result: task.result,
            error_message: task.error_message,
            created_utc: task.created_utc,
            updated_utc: task.updated_utc,
            started_utc: task.started_utc,
            finished_utc: task.finished_utc,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StatsQuery {
    #[serde(rename = "type")]
    pub task_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatsResponse {
    pub depth_by_status: Vec<QueueDepth>,
    pub depth_by_type: Vec<QueueDepthByType>,
    pub success_rate_24h: Vec<SuccessRate>,
    pub processing_ms_p95: f64,
    pub workers_active: i64,
    pub workers_stale: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub db: String,
}
