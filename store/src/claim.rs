// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Atomic task claiming: the only path by which a task moves from `queued`
//! to `leased`. Runs entirely inside one `BEGIN IMMEDIATE` transaction, so
//! the conditional `UPDATE ... WHERE status = 'queued'` can only ever see a
//! stale row if two stores on different connections (different processes)
//! race, in which case it simply affects zero rows and we move to the next
//! candidate.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use prismq_core::glob::matches_any;
use rand::Rng;
use rusqlite::params;

use crate::{
    error::StoreError,
    models::{LogLevel, SchedulingStrategy, Task},
    store::Store,
    transitions::{append_log, fetch_task},
};

/// Candidates examined per claim attempt before giving up with `Ok(None)`.
const CLAIM_BATCH_SIZE: i64 = 50;

impl Store {
    /// Try to lease one eligible task for `worker_id`. Returns `Ok(None)`
    /// when nothing is currently eligible (`NoEligibleTask`), not an error.
    pub fn claim_task(
        &self,
        worker_id: &str,
        capabilities: &[String],
        strategy: SchedulingStrategy,
        lease_duration: std::time::Duration,
        client_id: Option<&str>,
    ) -> Result<Option<Task>, StoreError> {
        self.with_transaction(|tx| {
            let order_by = match strategy {
                SchedulingStrategy::Fifo => "created_utc ASC, id ASC",
                SchedulingStrategy::Lifo => "created_utc DESC, id ASC",
                SchedulingStrategy::Priority => "priority ASC, created_utc ASC, id ASC",
                SchedulingStrategy::WeightedRandom => "priority ASC, created_utc ASC, id ASC",
            };
            let now = Utc::now();

            let sql = format!(
                "SELECT * FROM tasks
                 WHERE status = 'queued' AND run_after_utc <= ?1
                   AND (?2 IS NULL OR client_id = ?2)
                 ORDER BY {order_by}
                 LIMIT {CLAIM_BATCH_SIZE}"
            );
            let mut stmt = tx.prepare(&sql).map_err(StoreError::from_sqlite)?;
            let rows = stmt
                .query_map(params![now, client_id], |row| Task::from_row(row))
                .map_err(StoreError::from_sqlite)?;

            let mut candidates = Vec::new();
            for row in rows {
                let task = row.map_err(StoreError::from_sqlite)?;
                if matches_any(capabilities, &task.task_type) {
                    candidates.push(task);
                }
            }
            drop(stmt);

            if candidates.is_empty() {
                return Ok(None);
            }

            let ordered: Vec<Task> = if strategy == SchedulingStrategy::WeightedRandom {
                weighted_shuffle(candidates)
            } else {
                candidates
            };

            let lease_until: DateTime<Utc> =
                now + ChronoDuration::from_std(lease_duration).unwrap_or_default();

            for candidate in ordered {
                let affected = tx
                    .execute(
                        "UPDATE tasks SET status = 'leased', locked_by = ?1, lease_until_utc = ?2,
                            started_utc = COALESCE(started_utc, ?3), attempts = attempts + 1, updated_utc = ?3
                         WHERE id = ?4 AND status = 'queued'",
                        params![worker_id, lease_until, now, candidate.id],
                    )
                    .map_err(StoreError::from_sqlite)?;
                if affected == 1 {
                    append_log(
                        tx,
                        candidate.id,
                        LogLevel::Info,
                        &format!("leased by {worker_id}"),
                        None,
                    )?;
                    return Ok(Some(fetch_task(tx, candidate.id)?));
                }
            }
            Ok(None)
        })
    }

    /// Extend the lease on a task the caller still holds. Used by the
    /// executor's lease-renewal ticker for long-running handlers.
    ///
    /// Returns whether cancellation has been requested for this task since
    /// the lease was taken, so the ticker can stop the handler without a
    /// separate round trip to the store.
    pub fn renew_lease(
        &self,
        id: i64,
        worker_id: &str,
        lease_duration: std::time::Duration,
    ) -> Result<bool, StoreError> {
        self.with_transaction(|tx| {
            let now = Utc::now();
            let lease_until: DateTime<Utc> =
                now + ChronoDuration::from_std(lease_duration).unwrap_or_default();
            let affected = tx
                .execute(
                    "UPDATE tasks SET lease_until_utc = ?1, updated_utc = ?2
                     WHERE id = ?3 AND status = 'leased' AND locked_by = ?4",
                    params![lease_until, now, id, worker_id],
                )
                .map_err(StoreError::from_sqlite)?;
            if affected == 0 {
                return Err(StoreError::InvalidTransition {
                    task_id: id,
                    from: "leased".to_string(),
                    to: "leased (renew)".to_string(),
                });
            }
            let cancel_requested: bool = tx
                .query_row(
                    "SELECT cancel_requested FROM tasks WHERE id = ?1",
                    params![id],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(StoreError::from_sqlite)?
                != 0;
            Ok(cancel_requested)
        })
    }
}

/// Sample without replacement, weighting earlier-fetched (lower priority
/// number, i.e. higher-priority) candidates by `1 / (priority + 1)`.
fn weighted_shuffle(mut candidates: Vec<Task>) -> Vec<Task> {
    let mut rng = rand::thread_rng();
    let mut ordered = Vec::with_capacity(candidates.len());
    while !candidates.is_empty() {
        let weights: Vec<f64> = candidates
            .iter()
            .map(|t| 1.0 / (t.priority.max(0) as f64 + 1.0))
            .collect();
        let total: f64 = weights.iter().sum();
        let mut pick = rng.gen_range(0.0..total);
        let mut idx = candidates.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if pick < *w {
                idx = i;
                break;
            }
            pick -= w;
        }
        ordered.push(candidates.remove(idx));
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTask;

    fn store_with_task(task_type: &str) -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .enqueue(NewTask {
                task_type: task_type.to_string(),
                ..Default::default()
            })
            .unwrap();
        store
    }

    #[test]
    fn claims_eligible_task_and_sets_lease() {
        let store = store_with_task("sources.youtube");
        let caps = vec!["sources.*".to_string()];
        let claimed = store
            .claim_task(
                "worker-1",
                &caps,
                SchedulingStrategy::Fifo,
                std::time::Duration::from_secs(30),
                None,
            )
            .unwrap()
            .expect("a task should be eligible");
        assert_eq!(claimed.locked_by.as_deref(), Some("worker-1"));
        assert_eq!(claimed.attempts, 1);
    }

    #[test]
    fn capability_mismatch_yields_no_eligible_task() {
        let store = store_with_task("sources.youtube");
        let caps = vec!["billing.*".to_string()];
        let claimed = store
            .claim_task(
                "worker-1",
                &caps,
                SchedulingStrategy::Fifo,
                std::time::Duration::from_secs(30),
                None,
            )
            .unwrap();
        assert!(claimed.is_none());
    }

    #[test]
    fn second_claim_does_not_see_already_leased_task() {
        let store = store_with_task("sources.youtube");
        let caps = vec!["sources.**".to_string()];
        store
            .claim_task(
                "worker-1",
                &caps,
                SchedulingStrategy::Fifo,
                std::time::Duration::from_secs(30),
                None,
            )
            .unwrap()
            .unwrap();
        let second = store
            .claim_task(
                "worker-2",
                &caps,
                SchedulingStrategy::Fifo,
                std::time::Duration::from_secs(30),
                None,
            )
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn client_id_filter_scopes_claims() {
        let store = Store::open_in_memory().unwrap();
        store
            .enqueue(NewTask {
                task_type: "sources.youtube".into(),
                client_id: Some("tenant-a".into()),
                ..Default::default()
            })
            .unwrap();
        let caps = vec!["sources.*".to_string()];
        let claimed = store
            .claim_task(
                "worker-1",
                &caps,
                SchedulingStrategy::Fifo,
                std::time::Duration::from_secs(30),
                Some("tenant-b"),
            )
            .unwrap();
        assert!(claimed.is_none());

        let claimed = store
            .claim_task(
                "worker-1",
                &caps,
                SchedulingStrategy::Fifo,
                std::time::Duration::from_secs(30),
                Some("tenant-a"),
            )
            .unwrap();
        assert!(claimed.is_some());
    }
}
