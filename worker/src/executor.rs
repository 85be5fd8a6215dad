// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Runs one handler invocation end to end: lookup, lease renewal, the
//! handler call itself, and the single commit transaction that lands the
//! task in its next state.

use std::time::Duration;

use chrono::Utc;
use prismq_core::{
    metrics::{CLAIM_TO_COMPLETION_SECONDS, TASKS_COMPLETED_TOTAL, TASKS_DEAD_LETTERED_TOTAL, TASKS_FAILED_TOTAL},
    CancellationToken, CoreError, HandlerOutcome, HandlerRegistry, RetryPolicyResolver,
};
use prismq_store::{Store, Task};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::WorkerError;

/// Owns the dependencies an [`Executor`] needs to run one task to
/// completion: the store (for commits and lease renewal), the handler
/// registry (the only place a `type` string resolves to code), and the
/// retry policy resolver (backoff and dead-letter decisions).
#[derive(Clone)]
pub struct Executor {
    store: Store,
    registry: HandlerRegistry,
    retry: RetryPolicyResolver,
    lease_duration: Duration,
}

impl Executor {
    pub fn new(
        store: Store,
        registry: HandlerRegistry,
        retry: RetryPolicyResolver,
        lease_duration: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            retry,
            lease_duration,
        }
    }

    /// Execute `task`, which must already be `leased` to `worker_id`.
    /// `cancel` is the token the caller will trigger on a cancel request or
    /// worker shutdown; the handler is expected to observe it and return
    /// promptly.
    pub async fn execute(
        &self,
        task: Task,
        worker_id: &str,
        cancel: CancellationToken,
    ) -> Result<(), WorkerError> {
        let handler = match self.registry.lookup(&task.task_type) {
            Some(handler) => handler,
            None => {
                let err = CoreError::UnregisteredType(task.task_type.clone());
                error!(task_id = task.id, task_type = %task.task_type, "no handler registered");
                self.store
                    .fail_task_terminal(task.id, worker_id, &err.to_string())?;
                TASKS_FAILED_TOTAL.with_label_values(&[&task.task_type]).inc();
                return Ok(());
            }
        };

        let renew_cancel = CancellationToken::new();
        let renewal = {
            let store = self.store.clone();
            let id = task.id;
            let worker_id = worker_id.to_string();
            let lease_duration = self.lease_duration;
            let renew_cancel = renew_cancel.clone();
            let handler_cancel = cancel.clone();
            tokio::spawn(async move {
                let tick = lease_duration / 3;
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(tick) => {
                            match store.renew_lease(id, &worker_id, lease_duration) {
                                Ok(true) => {
                                    info!(task_id = id, "cancellation requested, signalling handler");
                                    handler_cancel.cancel();
                                    break;
                                }
                                Ok(false) => {}
                                Err(err) => {
                                    warn!(task_id = id, %err, "lease renewal failed, letting lease expire");
                                    break;
                                }
                            }
                        }
                        _ = renew_cancel.cancelled() => break,
                    }
                }
            })
        };

        let payload = task.payload.to_string().into_bytes();
        let outcome = handler.invoke(&payload, cancel.clone()).await;

        renew_cancel.cancel();
        let _ = renewal.await;

        if cancel.is_cancelled() {
            info!(task_id = task.id, "handler observed cancellation");
            self.store.cancel_leased_task(task.id, worker_id)?;
            return Ok(());
        }

        let elapsed_secs = task
            .started_utc
            .map(|started| (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0);

        match outcome {
            HandlerOutcome::Success(bytes) => {
                let result = decode_result(&bytes);
                self.store.complete_task(task.id, worker_id, Some(result))?;
                TASKS_COMPLETED_TOTAL.with_label_values(&[&task.task_type]).inc();
                CLAIM_TO_COMPLETION_SECONDS
                    .with_label_values(&[&task.task_type, "completed"])
                    .observe(elapsed_secs);
                info!(task_id = task.id, task_type = %task.task_type, "task completed");
            }
            HandlerOutcome::Failure(message) => {
                let policy = self.retry.resolve(&task.task_type);
                let dead_letter = policy.should_dead_letter(task.attempts, task.max_attempts);
                let backoff = policy.backoff(task.attempts);
                self.store
                    .fail_task(task.id, worker_id, &message, backoff, dead_letter)?;
                TASKS_FAILED_TOTAL.with_label_values(&[&task.task_type]).inc();
                let outcome_label = if dead_letter { "dead_letter" } else { "failed" };
                CLAIM_TO_COMPLETION_SECONDS
                    .with_label_values(&[&task.task_type, outcome_label])
                    .observe(elapsed_secs);
                if dead_letter {
                    TASKS_DEAD_LETTERED_TOTAL.with_label_values(&[&task.task_type]).inc();
                }
                warn!(
                    task_id = task.id,
                    task_type = %task.task_type,
                    attempts = task.attempts,
                    max_attempts = task.max_attempts,
                    dead_letter,
                    "task attempt failed"
                );
            }
        }
        Ok(())
    }
}

/// The handler's result bytes are stored verbatim if they parse as JSON;
/// otherwise they're wrapped as a JSON string so non-JSON handler outputs
/// never fail the commit.
fn decode_result(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prismq_core::{HandlerFn, RetryPolicy};
    use prismq_store::NewTask;
    use std::sync::Arc;

    fn executor_with(store: Store, registry: HandlerRegistry) -> Executor {
        executor_with_lease(store, registry, Duration::from_secs(30))
    }

    fn executor_with_lease(store: Store, registry: HandlerRegistry, lease_duration: Duration) -> Executor {
        Executor::new(
            store,
            registry,
            RetryPolicyResolver::new(RetryPolicy {
                base: Duration::from_millis(1),
                factor: 2.0,
                cap: Duration::from_millis(10),
                dead_letter_enabled: true,
            }),
            lease_duration,
        )
    }

    async fn claim_one(store: &Store, task_type: &str) -> Task {
        store
            .claim_task(
                "worker-1",
                &[format!("{task_type}")],
                prismq_store::SchedulingStrategy::Fifo,
                Duration::from_secs(30),
                None,
            )
            .unwrap()
            .expect("a task should be eligible")
    }

    #[tokio::test]
    async fn unregistered_type_fails_terminal_without_invoking_handler() {
        let store = Store::open_in_memory().unwrap();
        store
            .enqueue(NewTask {
                task_type: "t.nosuch".into(),
                ..Default::default()
            })
            .unwrap();
        let task = claim_one(&store, "t.*").await;
        let registry = HandlerRegistry::new();
        let executor = executor_with(store.clone(), registry);

        executor
            .execute(task.clone(), "worker-1", CancellationToken::new())
            .await
            .unwrap();

        let updated = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(updated.status, prismq_store::TaskStatus::FailedTerminal);
        assert_eq!(updated.attempts, 1);
    }

    #[tokio::test]
    async fn successful_handler_completes_task_with_result() {
        let store = Store::open_in_memory().unwrap();
        store
            .enqueue(NewTask {
                task_type: "t.ok".into(),
                ..Default::default()
            })
            .unwrap();
        let task = claim_one(&store, "t.*").await;

        let registry = HandlerRegistry::new();
        registry
            .register(
                "t.ok",
                Arc::new(HandlerFn::new(|_payload, _cancel| async move {
                    HandlerOutcome::Success(br#"{"ok":true}"#.to_vec())
                })),
                false,
            )
            .unwrap();
        let executor = executor_with(store.clone(), registry);

        executor
            .execute(task.clone(), "worker-1", CancellationToken::new())
            .await
            .unwrap();

        let updated = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(updated.status, prismq_store::TaskStatus::Completed);
        assert_eq!(updated.result, Some(serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn failing_handler_retries_until_max_attempts_then_dead_letters() {
        let store = Store::open_in_memory().unwrap();
        store
            .enqueue(NewTask {
                task_type: "t.boom".into(),
                max_attempts: 2,
                ..Default::default()
            })
            .unwrap();

        let registry = HandlerRegistry::new();
        registry
            .register(
                "t.boom",
                Arc::new(HandlerFn::new(|_payload, _cancel| async move {
                    HandlerOutcome::Failure("boom".to_string())
                })),
                false,
            )
            .unwrap();
        let executor = executor_with(store.clone(), registry);

        let first = claim_one(&store, "t.*").await;
        executor
            .execute(first.clone(), "worker-1", CancellationToken::new())
            .await
            .unwrap();
        let after_first = store.get_task(first.id).unwrap().unwrap();
        assert_eq!(after_first.status, prismq_store::TaskStatus::FailedRetrying);

        store
            .with_transaction(|tx| {
                tx.execute(
                    "UPDATE tasks SET run_after_utc = '2000-01-01T00:00:00Z' WHERE id = ?1",
                    rusqlite::params![first.id],
                )
                .unwrap();
                Ok(())
            })
            .unwrap();

        let second = claim_one(&store, "t.*").await;
        executor
            .execute(second.clone(), "worker-1", CancellationToken::new())
            .await
            .unwrap();
        let after_second = store.get_task(second.id).unwrap().unwrap();
        assert_eq!(after_second.status, prismq_store::TaskStatus::DeadLetter);
        assert_eq!(after_second.attempts, 2);
    }

    #[tokio::test]
    async fn cancellation_observed_during_handler_marks_task_cancelled() {
        let store = Store::open_in_memory().unwrap();
        store
            .enqueue(NewTask {
                task_type: "t.slow".into(),
                ..Default::default()
            })
            .unwrap();
        let task = claim_one(&store, "t.*").await;

        let registry = HandlerRegistry::new();
        registry
            .register(
                "t.slow",
                Arc::new(HandlerFn::new(|_payload, cancel| async move {
                    cancel.cancelled().await;
                    HandlerOutcome::Failure("cancelled mid-flight".to_string())
                })),
                false,
            )
            .unwrap();
        let executor = executor_with(store.clone(), registry);

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel_clone.cancel();
        });

        executor.execute(task.clone(), "worker-1", cancel).await.unwrap();

        let updated = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(updated.status, prismq_store::TaskStatus::Cancelled);
    }

    /// Simulates an HTTP-triggered cancel arriving while the task is
    /// leased: `Store::cancel_task` only flips `cancel_requested`, and the
    /// executor's own lease-renewal ticker is what has to notice it and
    /// signal the handler's token, without any registry shared from the
    /// HTTP process.
    #[tokio::test]
    async fn cancel_requested_mid_lease_is_picked_up_by_the_renewal_ticker() {
        let store = Store::open_in_memory().unwrap();
        store
            .enqueue(NewTask {
                task_type: "t.slow".into(),
                ..Default::default()
            })
            .unwrap();
        let task = claim_one(&store, "t.*").await;

        let registry = HandlerRegistry::new();
        registry
            .register(
                "t.slow",
                Arc::new(HandlerFn::new(|_payload, cancel| async move {
                    cancel.cancelled().await;
                    HandlerOutcome::Failure("cancelled mid-flight".to_string())
                })),
                false,
            )
            .unwrap();
        // A short lease means the renewal ticker fires within a few
        // milliseconds, so the test doesn't need a long sleep.
        let executor = executor_with_lease(store.clone(), registry, Duration::from_millis(30));

        let store_for_cancel = store.clone();
        let task_id = task.id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            store_for_cancel.cancel_task(task_id).unwrap();
        });

        executor
            .execute(task.clone(), "worker-1", CancellationToken::new())
            .await
            .unwrap();

        let updated = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(updated.status, prismq_store::TaskStatus::Cancelled);
        assert!(!updated.cancel_requested);
        assert!(updated.locked_by.is_none());
        assert!(updated.lease_until_utc.is_none());
    }
}
