// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! The task state machine. Every mutation of `tasks.status` lives here, each
//! wrapped in its own transaction, so nothing outside this module ever hands
//! out a bare `UPDATE tasks SET status = ...`.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde_json::Value;

use crate::{
    error::StoreError,
    models::{LogLevel, NewTask, Task, TaskStatus},
    store::Store,
};

/// Result of [`Store::enqueue`]: tells the caller whether the row was just
/// inserted or whether an idempotency-key collision returned an existing
/// row, so callers don't have to infer it from timestamps.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    Inserted(Task),
    Existing(Task),
}

impl EnqueueOutcome {
    pub fn into_task(self) -> Task {
        match self {
            EnqueueOutcome::Inserted(task) => task,
            EnqueueOutcome::Existing(task) => task,
        }
    }

    pub fn task(&self) -> &Task {
        match self {
            EnqueueOutcome::Inserted(task) => task,
            EnqueueOutcome::Existing(task) => task,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, EnqueueOutcome::Inserted(_))
    }
}

impl Store {
    /// Insert a new queued task. Idempotency is enforced by the unique
    /// partial index on `idempotency_key`; a duplicate key returns the
    /// original task rather than erroring, so producers can retry enqueue
    /// calls safely. The returned [`EnqueueOutcome`] tells the caller which
    /// of those two happened.
    pub fn enqueue(&self, new_task: NewTask) -> Result<EnqueueOutcome, StoreError> {
        self.with_transaction(|tx| {
            if let Some(key) = &new_task.idempotency_key {
                if let Some(existing) = find_by_idempotency_key(tx, key)? {
                    return Ok(EnqueueOutcome::Existing(existing));
                }
            }

            let now = Utc::now();
            tx.execute(
                "INSERT INTO tasks (
                    type, priority, payload, compatibility, status, attempts, max_attempts,
                    run_after_utc, created_utc, updated_utc, idempotency_key, client_id
                ) VALUES (?1, ?2, ?3, ?4, 'queued', 0, ?5, ?6, ?7, ?7, ?8, ?9)",
                params![
                    new_task.task_type,
                    new_task.priority,
                    new_task.payload.to_string(),
                    new_task.compatibility.to_string(),
                    new_task.max_attempts,
                    new_task.run_after_utc,
                    now,
                    new_task.idempotency_key,
                    new_task.client_id,
                ],
            )
            .map_err(StoreError::from_sqlite)?;

            let id = tx.last_insert_rowid();
            append_log(tx, id, LogLevel::Info, "enqueued", None)?;
            Ok(EnqueueOutcome::Inserted(fetch_task(tx, id)?))
        })
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>, StoreError> {
        self.with_transaction(|tx| match fetch_task(tx, id) {
            Ok(task) => Ok(Some(task)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        })
    }

    /// Cancel a task that hasn't reached a terminal state yet.
    ///
    /// A `queued` or `failed_retrying` task has no handler running, so it's
    /// marked cancelled immediately. A `leased` task has a handler in
    /// flight: this only flips `cancel_requested`, leaving `status`,
    /// `locked_by` and `lease_until_utc` untouched. The executor picks up
    /// the flag on its next lease-renewal tick, stops the handler, and
    /// commits the actual `cancelled` write itself via
    /// [`Store::cancel_leased_task`] — the only path allowed to clear
    /// `locked_by`/`lease_until_utc` on a cancellation.
    ///
    /// Idempotent: cancelling an already-`cancelled` task is a no-op that
    /// returns the current row rather than an error. Any other terminal
    /// state (`completed`, `failed_terminal`, `dead_letter`) still rejects
    /// with `InvalidTransition`, since there's nothing to cancel into.
    pub fn cancel_task(&self, id: i64) -> Result<Task, StoreError> {
        self.with_transaction(|tx| {
            let task = fetch_task(tx, id)?;
            if task.status == TaskStatus::Cancelled {
                return Ok(task);
            }
            if task.status.is_terminal() {
                return Err(StoreError::InvalidTransition {
                    task_id: id,
                    from: task.status.as_db_str().to_string(),
                    to: TaskStatus::Cancelled.as_db_str().to_string(),
                });
            }
            let now = Utc::now();
            if task.status == TaskStatus::Leased {
                tx.execute(
                    "UPDATE tasks SET cancel_requested = 1, updated_utc = ?1 WHERE id = ?2",
                    params![now, id],
                )
                .map_err(StoreError::from_sqlite)?;
                append_log(tx, id, LogLevel::Info, "cancellation requested", None)?;
                return fetch_task(tx, id);
            }
            tx.execute(
                "UPDATE tasks SET status = ?1, updated_utc = ?2, finished_utc = ?2 WHERE id = ?3",
                params![TaskStatus::Cancelled, now, id],
            )
            .map_err(StoreError::from_sqlite)?;
            append_log(tx, id, LogLevel::Info, "cancelled", None)?;
            fetch_task(tx, id)
        })
    }

    /// Commit a `cancelled` status for a leased task, clearing the lease the
    /// same way `complete_task`/`fail_task` do. Only the executor that
    /// actually held the lease and observed the cancellation signal should
    /// call this; it fails `ensure_held_by` otherwise, exactly like a stale
    /// worker trying to complete a lease it no longer holds.
    pub fn cancel_leased_task(&self, id: i64, worker_id: &str) -> Result<Task, StoreError> {
        self.with_transaction(|tx| {
            let task = fetch_task(tx, id)?;
            ensure_held_by(&task, worker_id, id)?;

            let now = Utc::now();
            tx.execute(
                "UPDATE tasks SET status = ?1, locked_by = NULL, lease_until_utc = NULL,
                    cancel_requested = 0, updated_utc = ?2, finished_utc = ?2
                 WHERE id = ?3",
                params![TaskStatus::Cancelled, now, id],
            )
            .map_err(StoreError::from_sqlite)?;
            append_log(tx, id, LogLevel::Info, "cancelled", None)?;
            fetch_task(tx, id)
        })
    }

    /// Mark a leased task completed. Fails if the caller isn't the worker
    /// currently holding the lease, so a worker whose lease already expired
    /// and was reclaimed can't clobber a newer attempt's result.
    pub fn complete_task(
        &self,
        id: i64,
        worker_id: &str,
        result: Option<Value>,
    ) -> Result<Task, StoreError> {
        self.with_transaction(|tx| {
            let task = fetch_task(tx, id)?;
            ensure_held_by(&task, worker_id, id)?;

            let now = Utc::now();
            tx.execute(
                "UPDATE tasks SET status = ?1, result = ?2, locked_by = NULL,
                    lease_until_utc = NULL, cancel_requested = 0, updated_utc = ?3, finished_utc = ?3
                 WHERE id = ?4",
                params![
                    TaskStatus::Completed,
                    result.map(|v| v.to_string()),
                    now,
                    id
                ],
            )
            .map_err(StoreError::from_sqlite)?;
            append_log(tx, id, LogLevel::Info, "completed", None)?;
            fetch_task(tx, id)
        })
    }

    /// Record a failed attempt. Moves the task to `failed_retrying` with a
    /// `run_after_utc` set to `now + backoff` if attempts remain, or to
    /// `dead_letter` / `failed_terminal` depending on the resolved policy.
    pub fn fail_task(
        &self,
        id: i64,
        worker_id: &str,
        error_message: &str,
        backoff: std::time::Duration,
        dead_letter: bool,
    ) -> Result<Task, StoreError> {
        self.with_transaction(|tx| {
            let task = fetch_task(tx, id)?;
            ensure_held_by(&task, worker_id, id)?;

            let now = Utc::now();
            let exhausted = task.attempts >= task.max_attempts;
            let next_status = if !exhausted {
                TaskStatus::FailedRetrying
            } else if dead_letter {
                TaskStatus::DeadLetter
            } else {
                TaskStatus::FailedTerminal
            };
            let run_after: DateTime<Utc> = now + chrono::Duration::from_std(backoff).unwrap_or_default();
            let finished = if next_status.is_terminal() { Some(now) } else { None };

            tx.execute(
                "UPDATE tasks SET status = ?1, error_message = ?2, locked_by = NULL,
                    lease_until_utc = NULL, cancel_requested = 0, run_after_utc = ?3,
                    updated_utc = ?4, finished_utc = ?5
                 WHERE id = ?6",
                params![next_status, error_message, run_after, now, finished, id],
            )
            .map_err(StoreError::from_sqlite)?;
            append_log(
                tx,
                id,
                LogLevel::Warning,
                &format!("attempt failed: {error_message}"),
                None,
            )?;
            fetch_task(tx, id)
        })
    }

    /// Mark a leased task `failed_terminal` immediately, bypassing the
    /// retry path entirely. Used for `UnregisteredType`: zero handler
    /// invocations and no retry, regardless of how many attempts remain.
    pub fn fail_task_terminal(
        &self,
        id: i64,
        worker_id: &str,
        error_message: &str,
    ) -> Result<Task, StoreError> {
        self.with_transaction(|tx| {
            let task = fetch_task(tx, id)?;
            ensure_held_by(&task, worker_id, id)?;

            let now = Utc::now();
            tx.execute(
                "UPDATE tasks SET status = ?1, error_message = ?2, locked_by = NULL,
                    lease_until_utc = NULL, cancel_requested = 0, updated_utc = ?3, finished_utc = ?3
                 WHERE id = ?4",
                params![TaskStatus::FailedTerminal, error_message, now, id],
            )
            .map_err(StoreError::from_sqlite)?;
            append_log(
                tx,
                id,
                LogLevel::Error,
                &format!("unregistered type: {error_message}"),
                None,
            )?;
            fetch_task(tx, id)
        })
    }

    pub fn append_task_log(
        &self,
        task_id: i64,
        level: LogLevel,
        message: &str,
        details: Option<Value>,
    ) -> Result<(), StoreError> {
        self.with_transaction(|tx| append_log(tx, task_id, level, message, details))
    }
}

fn ensure_held_by(task: &Task, worker_id: &str, id: i64) -> Result<(), StoreError> {
    if task.status != TaskStatus::Leased || task.locked_by.as_deref() != Some(worker_id) {
        return Err(StoreError::InvalidTransition {
            task_id: id,
            from: task.status.as_db_str().to_string(),
            to: "completed/failed".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn fetch_task(tx: &rusqlite::Transaction<'_>, id: i64) -> Result<Task, StoreError> {
    tx.query_row("SELECT * FROM tasks WHERE id = ?1", params![id], |row| {
        Task::from_row(row)
    })
    .map_err(|err| match err {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id),
        other => StoreError::from_sqlite(other),
    })
}

fn find_by_idempotency_key(
    tx: &rusqlite::Transaction<'_>,
    key: &str,
) -> Result<Option<Task>, StoreError> {
    let result = tx.query_row(
        "SELECT * FROM tasks WHERE idempotency_key = ?1",
        params![key],
        |row| Task::from_row(row),
    );
    match result {
        Ok(task) => Ok(Some(task)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(other) => Err(StoreError::from_sqlite(other)),
    }
}

pub(crate) fn append_log(
    tx: &rusqlite::Transaction<'_>,
    task_id: i64,
    level: LogLevel,
    message: &str,
    details: Option<Value>,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO task_logs (task_id, at_utc, level, message, details) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            task_id,
            Utc::now(),
            level.as_db_str(),
            message,
            details.map(|v| v.to_string())
        ],
    )
    .map_err(StoreError::from_sqlite)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn enqueue_is_idempotent_on_key() {
        let store = store();
        let new_task = NewTask {
            task_type: "sources.youtube".into(),
            idempotency_key: Some("key-1".into()),
            ..Default::default()
        };
        let first = store.enqueue(new_task.clone()).unwrap();
        let second = store.enqueue(new_task.clone()).unwrap();
        assert!(first.was_inserted());
        assert!(!second.was_inserted());
        assert_eq!(first.task().id, second.task().id);
    }

    #[test]
    fn fail_task_terminal_skips_retry_regardless_of_attempts_remaining() {
        let store = store();
        let task = store
            .enqueue(NewTask {
                task_type: "t.nosuch".into(),
                max_attempts: 5,
                ..Default::default()
            })
            .unwrap()
            .into_task();
        let claimed = store
            .claim_task(
                "worker-1",
                &["t.*".to_string()],
                crate::models::SchedulingStrategy::Fifo,
                std::time::Duration::from_secs(30),
                None,
            )
            .unwrap()
            .unwrap();
        assert_eq!(claimed.attempts, 1);

        let result = store
            .fail_task_terminal(task.id, "worker-1", "no handler registered")
            .unwrap();
        assert_eq!(result.status, TaskStatus::FailedTerminal);
        assert_eq!(result.attempts, 1, "no retry means attempts never climbs toward max_attempts");
    }

    #[test]
    fn cancel_is_idempotent_on_an_already_cancelled_task() {
        let store = store();
        let task = store
            .enqueue(NewTask {
                task_type: "sources.youtube".into(),
                ..Default::default()
            })
            .unwrap()
            .into_task();
        let first = store.cancel_task(task.id).unwrap();
        let second = store.cancel_task(task.id).unwrap();
        assert_eq!(first.status, TaskStatus::Cancelled);
        assert_eq!(second.status, TaskStatus::Cancelled);
    }

    #[test]
    fn cancel_rejects_other_terminal_states() {
        let store = store();
        let task = store
            .enqueue(NewTask {
                task_type: "sources.youtube".into(),
                max_attempts: 1,
                ..Default::default()
            })
            .unwrap()
            .into_task();
        let claimed = store
            .claim_task(
                "worker-1",
                &["sources.*".to_string()],
                crate::models::SchedulingStrategy::Fifo,
                std::time::Duration::from_secs(30),
                None,
            )
            .unwrap()
            .unwrap();
        store
            .complete_task(claimed.id, "worker-1", None)
            .unwrap();

        let err = store.cancel_task(task.id).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn cancel_on_a_leased_task_only_sets_the_flag() {
        let store = store();
        let task = store
            .enqueue(NewTask {
                task_type: "sources.youtube".into(),
                ..Default::default()
            })
            .unwrap()
            .into_task();
        let claimed = store
            .claim_task(
                "worker-1",
                &["sources.*".to_string()],
                crate::models::SchedulingStrategy::Fifo,
                std::time::Duration::from_secs(30),
                None,
            )
            .unwrap()
            .unwrap();

        let requested = store.cancel_task(task.id).unwrap();
        assert_eq!(requested.status, TaskStatus::Leased);
        assert!(requested.cancel_requested);
        assert_eq!(requested.locked_by.as_deref(), Some("worker-1"));
        assert!(requested.lease_until_utc.is_some());

        let committed = store.cancel_leased_task(claimed.id, "worker-1").unwrap();
        assert_eq!(committed.status, TaskStatus::Cancelled);
        assert!(!committed.cancel_requested);
        assert!(committed.locked_by.is_none());
        assert!(committed.lease_until_utc.is_none());
    }

    #[test]
    fn cancel_leased_task_rejects_a_worker_that_no_longer_holds_the_lease() {
        let store = store();
        let task = store
            .enqueue(NewTask {
                task_type: "sources.youtube".into(),
                ..Default::default()
            })
            .unwrap()
            .into_task();
        store
            .claim_task(
                "worker-1",
                &["sources.*".to_string()],
                crate::models::SchedulingStrategy::Fifo,
                std::time::Duration::from_secs(30),
                None,
            )
            .unwrap()
            .unwrap();

        let err = store.cancel_leased_task(task.id, "worker-2").unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    /// Table-driven sweep over the permitted edges: every terminal status
    /// rejects a second `cancel_task`, confirming cancellation is the only
    /// non-idempotent-by-convention edge into `cancelled`.
    #[rstest::rstest]
    #[case::completed(true, false)]
    #[case::failed_terminal(false, false)]
    #[case::dead_letter(false, true)]
    fn terminal_states_reject_cancel(#[case] complete: bool, #[case] dead_letter: bool) {
        let store = store();
        let task = store
            .enqueue(NewTask {
                task_type: "t.terminal".into(),
                max_attempts: 1,
                ..Default::default()
            })
            .unwrap()
            .into_task();
        let claimed = store
            .claim_task(
                "worker-1",
                &["t.*".to_string()],
                crate::models::SchedulingStrategy::Fifo,
                std::time::Duration::from_secs(30),
                None,
            )
            .unwrap()
            .unwrap();

        if complete {
            store.complete_task(claimed.id, "worker-1", None).unwrap();
        } else {
            store
                .fail_task(
                    claimed.id,
                    "worker-1",
                    "boom",
                    std::time::Duration::from_secs(0),
                    dead_letter,
                )
                .unwrap();
        }

        let err = store.cancel_task(task.id).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }
}
