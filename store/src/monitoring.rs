// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Worker heartbeats, stale-lease reclamation, and the cheap read-side
//! queries behind `GET /queue/stats`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::params;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::StoreError,
    models::LogLevel,
    store::Store,
    transitions::append_log,
};

#[derive(Debug, Clone, Serialize, Default, ToSchema)]
pub struct QueueDepth {
    pub status: String,
    pub depth: i64,
}

#[derive(Debug, Clone, Serialize, Default, ToSchema)]
pub struct QueueDepthByType {
    pub task_type: String,
    pub status: String,
    pub depth: i64,
}

#[derive(Debug, Clone, Serialize, Default, ToSchema)]
pub struct SuccessRate {
    pub task_type: String,
    pub completed: i64,
    pub failed: i64,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Default, ToSchema)]
pub struct ProcessingTimePercentiles {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Serialize, Default, ToSchema)]
pub struct RecentFailure {
    pub id: i64,
    pub task_type: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub status: String,
    pub error_message: Option<String>,
    pub updated_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Default, ToSchema)]
pub struct WorkerActivity {
    pub worker_id: String,
    pub heartbeat_utc: DateTime<Utc>,
    pub active_leases: i64,
    pub seconds_since_heartbeat: f64,
}

impl Store {
    /// Upsert a worker's liveness row. Called on startup and on every
    /// heartbeat tick by the worker engine.
    pub fn heartbeat(
        &self,
        worker_id: &str,
        capabilities: &[String],
        client_id: Option<&str>,
    ) -> Result<(), StoreError> {
        self.with_transaction(|tx| {
            let now = Utc::now();
            let caps_json = serde_json::to_string(capabilities)?;
            tx.execute(
                "INSERT INTO workers (id, capabilities, heartbeat_utc, registered_utc, client_id)
                 VALUES (?1, ?2, ?3, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    capabilities = excluded.capabilities,
                    heartbeat_utc = excluded.heartbeat_utc",
                params![worker_id, caps_json, now, client_id],
            )
            .map_err(StoreError::from_sqlite)?;
            Ok(())
        })
    }

    /// Reclaim tasks whose lease expired without a heartbeat. A task with no
    /// pending cancellation flips back to `queued` without incrementing
    /// `attempts`, since it never got a fair chance to run to completion.
    /// A task whose worker crashed after a cancellation was requested but
    /// before it committed `cancelled` is instead finished as `cancelled`
    /// here, so a pending cancellation can't be stranded forever by a dead
    /// worker. Returns the number reclaimed.
    pub fn reclaim_stale_leases(&self) -> Result<u64, StoreError> {
        self.with_transaction(|tx| {
            let now = Utc::now();
            let mut stmt = tx
                .prepare(
                    "SELECT id, cancel_requested FROM tasks WHERE status = 'leased' AND lease_until_utc < ?1",
                )
                .map_err(StoreError::from_sqlite)?;
            let stale: Vec<(i64, bool)> = stmt
                .query_map(params![now], |row| {
                    Ok((row.get(0)?, row.get::<_, i64>(1)? != 0))
                })
                .map_err(StoreError::from_sqlite)?
                .collect::<Result<_, _>>()
                .map_err(StoreError::from_sqlite)?;
            drop(stmt);

            for (id, cancel_requested) in &stale {
                if *cancel_requested {
                    tx.execute(
                        "UPDATE tasks SET status = 'cancelled', locked_by = NULL, lease_until_utc = NULL,
                            cancel_requested = 0, updated_utc = ?1, finished_utc = ?1 WHERE id = ?2",
                        params![now, id],
                    )
                    .map_err(StoreError::from_sqlite)?;
                    append_log(tx, *id, LogLevel::Info, "lease expired, cancellation honored", None)?;
                } else {
                    tx.execute(
                        "UPDATE tasks SET status = 'queued', locked_by = NULL, lease_until_utc = NULL,
                            updated_utc = ?1 WHERE id = ?2",
                        params![now, id],
                    )
                    .map_err(StoreError::from_sqlite)?;
                    append_log(tx, *id, LogLevel::Warning, "lease expired, reclaimed", None)?;
                }
            }
            Ok(stale.len() as u64)
        })
    }

    /// Workers that haven't heartbeat within `stale_after` are dropped from
    /// the `workers` table; their leased tasks are left for
    /// `reclaim_stale_leases` to pick up once the lease itself expires.
    pub fn prune_stale_workers(&self, stale_after: std::time::Duration) -> Result<u64, StoreError> {
        self.with_transaction(|tx| {
            let cutoff: DateTime<Utc> =
                Utc::now() - ChronoDuration::from_std(stale_after).unwrap_or_default();
            let affected = tx
                .execute(
                    "DELETE FROM workers WHERE heartbeat_utc < ?1",
                    params![cutoff],
                )
                .map_err(StoreError::from_sqlite)?;
            Ok(affected as u64)
        })
    }

    pub fn queue_depth_by_status(&self) -> Result<Vec<QueueDepth>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare("SELECT status, depth FROM queue_depth_by_status")
            .map_err(StoreError::from_sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(QueueDepth {
                    status: row.get(0)?,
                    depth: row.get(1)?,
                })
            })
            .map_err(StoreError::from_sqlite)?;
        rows.collect::<Result<_, _>>().map_err(StoreError::from_sqlite)
    }

    /// Per-`(type, status)` counts, backing both `GET /queue/stats` and the
    /// Prometheus queue-depth gauge.
    pub fn queue_depth_by_type(&self) -> Result<Vec<QueueDepthByType>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare("SELECT type, status, depth FROM queue_depth_by_type")
            .map_err(StoreError::from_sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(QueueDepthByType {
                    task_type: row.get(0)?,
                    status: row.get(1)?,
                    depth: row.get(2)?,
                })
            })
            .map_err(StoreError::from_sqlite)?;
        rows.collect::<Result<_, _>>().map_err(StoreError::from_sqlite)
    }

    pub fn recent_failures(&self, limit: i64) -> Result<Vec<RecentFailure>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare("SELECT id, type, attempts, max_attempts, status, error_message, updated_utc FROM recent_failures LIMIT ?1")
            .map_err(StoreError::from_sqlite)?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(RecentFailure {
                    id: row.get(0)?,
                    task_type: row.get(1)?,
                    attempts: row.get(2)?,
                    max_attempts: row.get(3)?,
                    status: row.get(4)?,
                    error_message: row.get(5)?,
                    updated_utc: row.get(6)?,
                })
            })
            .map_err(StoreError::from_sqlite)?;
        rows.collect::<Result<_, _>>().map_err(StoreError::from_sqlite)
    }

    pub fn worker_activity(&self) -> Result<Vec<WorkerActivity>, StoreError> {
        let guard = self.lock()?;
        let now = Utc::now();
        let mut stmt = guard
            .prepare("SELECT worker_id, heartbeat_utc, active_leases FROM worker_activity")
            .map_err(StoreError::from_sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                let heartbeat_utc: DateTime<Utc> = row.get(1)?;
                Ok(WorkerActivity {
                    worker_id: row.get(0)?,
                    heartbeat_utc,
                    active_leases: row.get(2)?,
                    seconds_since_heartbeat: (now - heartbeat_utc).num_milliseconds() as f64 / 1000.0,
                })
            })
            .map_err(StoreError::from_sqlite)?;
        rows.collect::<Result<_, _>>().map_err(StoreError::from_sqlite)
    }

    /// Success rate per task type over the trailing window.
    pub fn success_rates(&self, window: std::time::Duration) -> Result<Vec<SuccessRate>, StoreError> {
        let guard = self.lock()?;
        let cutoff: DateTime<Utc> = Utc::now() - ChronoDuration::from_std(window).unwrap_or_default();
        let mut stmt = guard
            .prepare(
                "SELECT type,
                    SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS completed,
                    SUM(CASE WHEN status IN ('failed_terminal', 'dead_letter') THEN 1 ELSE 0 END) AS failed
                 FROM tasks
                 WHERE updated_utc >= ?1 AND status IN ('completed', 'failed_terminal', 'dead_letter')
                 GROUP BY type",
            )
            .map_err(StoreError::from_sqlite)?;
        let rows = stmt
            .query_map(params![cutoff], |row| {
                let completed: i64 = row.get(1)?;
                let failed: i64 = row.get(2)?;
                let total = (completed + failed).max(1) as f64;
                Ok(SuccessRate {
                    task_type: row.get(0)?,
                    completed,
                    failed,
                    rate: completed as f64 / total,
                })
            })
            .map_err(StoreError::from_sqlite)?;
        rows.collect::<Result<_, _>>().map_err(StoreError::from_sqlite)
    }

    /// p50/p95/p99 processing time for tasks completed within the trailing
    /// window. Computed in Rust: SQLite has no native percentile aggregate.
    pub fn processing_time_percentiles(
        &self,
        window: std::time::Duration,
    ) -> Result<ProcessingTimePercentiles, StoreError> {
        let guard = self.lock()?;
        let cutoff: DateTime<Utc> = Utc::now() - ChronoDuration::from_std(window).unwrap_or_default();
        let mut stmt = guard
            .prepare(
                "SELECT started_utc, finished_utc FROM tasks
                 WHERE status = 'completed' AND finished_utc >= ?1
                    AND started_utc IS NOT NULL AND finished_utc IS NOT NULL",
            )
            .map_err(StoreError::from_sqlite)?;
        let mut durations_ms: Vec<f64> = stmt
            .query_map(params![cutoff], |row| {
                let started: DateTime<Utc> = row.get(0)?;
                let finished: DateTime<Utc> = row.get(1)?;
                Ok((finished - started).num_milliseconds() as f64)
            })
            .map_err(StoreError::from_sqlite)?
            .collect::<Result<_, _>>()
            .map_err(StoreError::from_sqlite)?;

        durations_ms.sort_by(|a, b| a.partial_cmp(b).unwrap());
        Ok(ProcessingTimePercentiles {
            p50_ms: percentile(&durations_ms, 0.50),
            p95_ms: percentile(&durations_ms, 0.95),
            p99_ms: percentile(&durations_ms, 0.99),
            sample_size: durations_ms.len(),
        })
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_upserts_worker_row() {
        let store = Store::open_in_memory().unwrap();
        store.heartbeat("w1", &["sources.*".to_string()], None).unwrap();
        store.heartbeat("w1", &["sources.*".to_string()], None).unwrap();
        let activity = store.worker_activity().unwrap();
        assert_eq!(activity.len(), 1);
    }

    #[test]
    fn queue_depth_by_type_groups_on_both_columns() {
        let store = Store::open_in_memory().unwrap();
        store
            .enqueue(crate::models::NewTask {
                task_type: "sources.youtube".into(),
                ..Default::default()
            })
            .unwrap();
        store
            .enqueue(crate::models::NewTask {
                task_type: "sources.youtube".into(),
                ..Default::default()
            })
            .unwrap();
        store
            .enqueue(crate::models::NewTask {
                task_type: "billing.invoice".into(),
                ..Default::default()
            })
            .unwrap();

        let rows = store.queue_depth_by_type().unwrap();
        let youtube_queued = rows
            .iter()
            .find(|r| r.task_type == "sources.youtube" && r.status == "queued")
            .unwrap();
        assert_eq!(youtube_queued.depth, 2);
        assert!(rows.iter().any(|r| r.task_type == "billing.invoice"));
    }

    #[test]
    fn percentile_of_empty_set_is_zero() {
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn percentile_picks_expected_rank() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 1.0), 5.0);
    }
}
