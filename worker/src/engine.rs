// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! The long-running worker loop: register, heartbeat, claim, execute,
//! repeat, with bounded concurrency and a jittered backoff when nothing is
//! eligible to claim.

use std::{sync::Arc, time::Duration};

use prismq_core::{CancellationToken, HandlerRegistry, RetryPolicyResolver};
use prismq_store::{SchedulingStrategy, Store};
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::{error::WorkerError, executor::Executor};

/// Everything a [`WorkerEngine`] needs to know about its own identity and
/// operating parameters. Constructed explicitly by the caller (binary
/// `main`) rather than pulled from ambient globals.
#[derive(Debug, Clone)]
pub struct WorkerEngineConfig {
    pub worker_id: String,
    pub capabilities: Vec<String>,
    pub client_id: Option<String>,
    pub concurrency: usize,
    pub strategy: SchedulingStrategy,
    pub lease_duration: Duration,
    pub heartbeat_interval: Duration,
    pub claim_backoff_base: Duration,
    pub claim_backoff_cap: Duration,
    pub shutdown_grace: Duration,
}

impl Default for WorkerEngineConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker".to_string(),
            capabilities: Vec::new(),
            client_id: None,
            concurrency: 1,
            strategy: SchedulingStrategy::Priority,
            lease_duration: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(15),
            claim_backoff_base: Duration::from_millis(100),
            claim_backoff_cap: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

pub struct WorkerEngine {
    store: Store,
    executor: Executor,
    config: WorkerEngineConfig,
}

impl WorkerEngine {
    pub fn new(
        store: Store,
        registry: HandlerRegistry,
        retry: RetryPolicyResolver,
        config: WorkerEngineConfig,
    ) -> Self {
        let executor = Executor::new(store.clone(), registry, retry, config.lease_duration);
        Self {
            store,
            executor,
            config,
        }
    }

    /// Run until `shutdown` is cancelled. Registers the worker, starts the
    /// heartbeat, then loops claim→execute with up to `concurrency`
    /// in-flight invocations. On shutdown: stop claiming, cancel in-flight
    /// handlers, wait up to `shutdown_grace` for their commits.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        self.store.heartbeat(
            &self.config.worker_id,
            &self.config.capabilities,
            self.config.client_id.as_deref(),
        )?;
        info!(worker_id = %self.config.worker_id, capabilities = ?self.config.capabilities, "worker registered");

        let heartbeat_task = {
            let store = self.store.clone();
            let worker_id = self.config.worker_id.clone();
            let capabilities = self.config.capabilities.clone();
            let client_id = self.config.client_id.clone();
            let interval = self.config.heartbeat_interval;
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            if let Err(err) = store.heartbeat(&worker_id, &capabilities, client_id.as_deref()) {
                                warn!(%err, "heartbeat failed");
                            }
                        }
                        _ = shutdown.cancelled() => break,
                    }
                }
            })
        };

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let invocation_cancel = CancellationToken::new();

        while !shutdown.is_cancelled() {
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => permit.expect("semaphore never closed"),
                _ = shutdown.cancelled() => break,
            };

            let claimed = self.store.claim_task(
                &self.config.worker_id,
                &self.config.capabilities,
                self.config.strategy,
                self.config.lease_duration,
                self.config.client_id.as_deref(),
            )?;

            match claimed {
                Some(task) => {
                    let executor = self.executor.clone();
                    let worker_id = self.config.worker_id.clone();
                    let task_cancel = invocation_cancel.child_token();
                    tokio::spawn(async move {
                        let task_id = task.id;
                        if let Err(err) = executor.execute(task, &worker_id, task_cancel).await {
                            warn!(task_id, %err, "executor invocation failed");
                        }
                        drop(permit);
                    });
                }
                None => {
                    drop(permit);
                    let backoff = jittered_backoff(
                        self.config.claim_backoff_base,
                        self.config.claim_backoff_cap,
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "shutting down, cancelling in-flight invocations");
        invocation_cancel.cancel();
        let wait_for_drain = semaphore.acquire_many(self.config.concurrency as u32);
        if tokio::time::timeout(self.config.shutdown_grace, wait_for_drain)
            .await
            .is_err()
        {
            warn!(
                worker_id = %self.config.worker_id,
                "shutdown grace period elapsed with invocations still running; their leases will expire and be reclaimed"
            );
        }

        heartbeat_task.abort();
        Ok(())
    }
}

/// `min(base * 2^n, cap)`-free jitter: uniform in `[0, cap]`.
fn jittered_backoff(base: Duration, cap: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let upper = cap.max(base).as_secs_f64();
    let lower = base.as_secs_f64().min(upper);
    Duration::from_secs_f64(rng.gen_range(lower..=upper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prismq_core::{HandlerFn, HandlerOutcome, RetryPolicy};
    use prismq_store::NewTask;
    use std::sync::Arc as StdArc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn claims_and_completes_a_noop_task() {
        let store = Store::open_in_memory().unwrap();
        store
            .enqueue(NewTask {
                task_type: "t.ok".into(),
                ..Default::default()
            })
            .unwrap();

        let registry = HandlerRegistry::new();
        let invocations = StdArc::new(AtomicUsize::new(0));
        let counter = invocations.clone();
        registry
            .register(
                "t.ok",
                StdArc::new(HandlerFn::new(move |_payload, _cancel| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        HandlerOutcome::Success(b"{}".to_vec())
                    }
                })),
                false,
            )
            .unwrap();

        let config = WorkerEngineConfig {
            worker_id: "w1".into(),
            capabilities: vec!["t.*".to_string()],
            concurrency: 2,
            ..Default::default()
        };
        let engine = WorkerEngine::new(
            store.clone(),
            registry,
            RetryPolicyResolver::new(RetryPolicy::default()),
            config,
        );

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            shutdown_clone.cancel();
        });
        engine.run(shutdown).await.unwrap();

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }
}
