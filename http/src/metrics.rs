// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Prometheus gauges/counters, distinct from `/queue/stats`'s JSON business
//! metrics: infra dashboards scrape `/metrics`, operators read `/queue/stats`.
//!
//! The store is the only thing multiple worker and API processes share, so
//! depth/success-rate/worker-liveness metrics are re-derived from it on
//! every scrape rather than accumulated as in-process counters, which would
//! only ever reflect this one process's view of a multi-process queue.
//! `TASKS_ENQUEUED` and `LEASE_RECLAIMS` are real per-process counters
//! because enqueue and stale-lease reclamation both happen inside this
//! process (the HTTP surface and the maintenance scheduler, respectively).
//!
//! `TASKS_COMPLETED_TOTAL`, `TASKS_FAILED_TOTAL`, `TASKS_DEAD_LETTERED_TOTAL`
//! and `CLAIM_TO_COMPLETION_SECONDS` live in `prismq_core::metrics` instead,
//! since the executor that actually observes those transitions runs in the
//! `prismq-worker` process, not this one; they're re-exported here so this
//! module's scrape output carries them whenever the two are colocated in
//! one process.

use once_cell::sync::Lazy;
use prismq_store::Store;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, register_int_gauge,
    register_int_gauge_vec, CounterVec, Gauge, IntCounter, IntGauge, IntGaugeVec,
};

pub use prismq_core::metrics::{
    CLAIM_TO_COMPLETION_SECONDS, TASKS_COMPLETED_TOTAL, TASKS_DEAD_LETTERED_TOTAL, TASKS_FAILED_TOTAL,
};

pub static TASKS_ENQUEUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("prismq_tasks_enqueued_total", "tasks enqueued by type", &["type"])
        .expect("metric registration")
});

pub static LEASE_RECLAIMS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "prismq_lease_reclaims_total",
        "tasks whose lease expired and were reclaimed to queued"
    )
    .expect("metric registration")
});

pub static QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "prismq_queue_depth",
        "current task count by type and status",
        &["type", "status"]
    )
    .expect("metric registration")
});

pub static SUCCESS_RATE_24H: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "prismq_success_rate_24h",
        "fraction of terminal tasks across all types that completed successfully in the trailing 24h"
    )
    .expect("metric registration")
});

pub static ACTIVE_WORKERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("prismq_active_workers", "workers with a recent heartbeat")
        .expect("metric registration")
});

pub static STALE_WORKERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("prismq_stale_workers", "workers whose heartbeat has gone silent")
        .expect("metric registration")
});

const STALE_WORKER_THRESHOLD_SECS: f64 = 300.0;

/// Re-derive the gauges from the store. Called once per `/metrics` scrape;
/// a failed query leaves the previous gauge values in place rather than
/// resetting them to zero, so a transient `Busy` doesn't make a healthy
/// queue look empty on a dashboard.
pub fn refresh_gauges(store: &Store) {
    if let Ok(rows) = store.queue_depth_by_type() {
        for row in rows {
            QUEUE_DEPTH
                .with_label_values(&[&row.task_type, &row.status])
                .set(row.depth);
        }
    }

    if let Ok(rates) = store.success_rates(std::time::Duration::from_secs(24 * 3600)) {
        let completed: i64 = rates.iter().map(|r| r.completed).sum();
        let failed: i64 = rates.iter().map(|r| r.failed).sum();
        let total = (completed + failed).max(1) as f64;
        SUCCESS_RATE_24H.set(completed as f64 / total);
    }

    if let Ok(workers) = store.worker_activity() {
        let active = workers
            .iter()
            .filter(|w| w.seconds_since_heartbeat <= STALE_WORKER_THRESHOLD_SECS)
            .count() as i64;
        ACTIVE_WORKERS.set(active);
        STALE_WORKERS.set(workers.len() as i64 - active);
    }
}
