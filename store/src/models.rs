// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Row types shared by every component that talks to the store.

use chrono::{DateTime, Utc};
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::StoreError;

/// The lifecycle state of a task. Transitions are enforced by [`crate::transitions`],
/// never by assigning this field directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Leased,
    Completed,
    FailedRetrying,
    FailedTerminal,
    DeadLetter,
    Cancelled,
}

impl TaskStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Leased => "leased",
            TaskStatus::Completed => "completed",
            TaskStatus::FailedRetrying => "failed_retrying",
            TaskStatus::FailedTerminal => "failed_terminal",
            TaskStatus::DeadLetter => "dead_letter",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, StoreError> {
        Ok(match s {
            "queued" => TaskStatus::Queued,
            "leased" => TaskStatus::Leased,
            "completed" => TaskStatus::Completed,
            "failed_retrying" => TaskStatus::FailedRetrying,
            "failed_terminal" => TaskStatus::FailedTerminal,
            "dead_letter" => TaskStatus::DeadLetter,
            "cancelled" => TaskStatus::Cancelled,
            other => return Err(StoreError::Schema(format!("unknown task status {other}"))),
        })
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::FailedTerminal
                | TaskStatus::DeadLetter
                | TaskStatus::Cancelled
        )
    }
}

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(self.as_db_str().into())
    }
}

/// Ordering used by the claimer to pick among eligible queued tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStrategy {
    Fifo,
    Lifo,
    Priority,
    WeightedRandom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }
}

/// One row of the `tasks` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    #[serde(rename = "type")]
    pub task_type: String,
    pub priority: i32,
    pub payload: Value,
    pub compatibility: Value,
    pub status: TaskStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub locked_by: Option<String>,
    pub lease_until_utc: Option<DateTime<Utc>>,
    pub run_after_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub started_utc: Option<DateTime<Utc>>,
    pub finished_utc: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub idempotency_key: Option<String>,
    pub result: Option<Value>,
    pub client_id: Option<String>,
    pub cancel_requested: bool,
}

impl Task {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status_str: String = row.get("status")?;
        let payload_str: String = row.get("payload")?;
        let compatibility_str: String = row.get("compatibility")?;
        let result_str: Option<String> = row.get("result")?;

        Ok(Task {
            id: row.get("id")?,
            task_type: row.get("type")?,
            priority: row.get("priority")?,
            payload: serde_json::from_str(&payload_str).unwrap_or(Value::Null),
            compatibility: serde_json::from_str(&compatibility_str).unwrap_or(Value::Null),
            status: TaskStatus::from_db_str(&status_str)
                .map_err(|_| rusqlite::Error::InvalidColumnType(0, "status".into(), rusqlite::types::Type::Text))?,
            attempts: row.get("attempts")?,
            max_attempts: row.get("max_attempts")?,
            locked_by: row.get("locked_by")?,
            lease_until_utc: row.get("lease_until_utc")?,
            run_after_utc: row.get("run_after_utc")?,
            created_utc: row.get("created_utc")?,
            updated_utc: row.get("updated_utc")?,
            started_utc: row.get("started_utc")?,
            finished_utc: row.get("finished_utc")?,
            error_message: row.get("error_message")?,
            idempotency_key: row.get("idempotency_key")?,
            result: result_str
                .map(|s| serde_json::from_str(&s).unwrap_or(Value::Null)),
            client_id: row.get("client_id")?,
            cancel_requested: row.get::<_, i64>("cancel_requested")? != 0,
        })
    }
}

/// One row of the `workers` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub capabilities: Vec<String>,
    pub heartbeat_utc: DateTime<Utc>,
    pub registered_utc: DateTime<Utc>,
    pub client_id: Option<String>,
}

impl Worker {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let capabilities_str: String = row.get("capabilities")?;
        Ok(Worker {
            id: row.get("id")?,
            capabilities: serde_json::from_str(&capabilities_str).unwrap_or_default(),
            heartbeat_utc: row.get("heartbeat_utc")?,
            registered_utc: row.get("registered_utc")?,
            client_id: row.get("client_id")?,
        })
    }
}

/// One row of the `task_logs` table: an append-only audit trail per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: i64,
    pub task_id: i64,
    pub at_utc: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<Value>,
}

impl TaskLog {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let level_str: String = row.get("level")?;
        let details_str: Option<String> = row.get("details")?;
        Ok(TaskLog {
            id: row.get("id")?,
            task_id: row.get("task_id")?,
            at_utc: row.get("at_utc")?,
            level: match level_str.as_str() {
                "debug" => LogLevel::Debug,
                "info" => LogLevel::Info,
                "warning" => LogLevel::Warning,
                "error" => LogLevel::Error,
                _ => LogLevel::Critical,
            },
            message: row.get("message")?,
            details: details_str.map(|s| serde_json::from_str(&s).unwrap_or(Value::Null)),
        })
    }
}

/// Inputs accepted by `Store::enqueue`; everything with a default is optional
/// on the HTTP surface.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_type: String,
    pub priority: i32,
    pub payload: Value,
    pub compatibility: Value,
    pub max_attempts: i32,
    pub run_after_utc: DateTime<Utc>,
    pub idempotency_key: Option<String>,
    pub client_id: Option<String>,
}

impl Default for NewTask {
    fn default() -> Self {
        Self {
            task_type: String::new(),
            priority: 100,
            payload: Value::Object(Default::default()),
            compatibility: Value::Object(Default::default()),
            max_attempts: 3,
            run_after_utc: Utc::now(),
            idempotency_key: None,
            client_id: None,
        }
    }
}
