// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Cumulative transition counters and the claim-to-completion latency
//! histogram. These live here rather than in the HTTP crate because the
//! worker and the HTTP server are separate processes sharing only the
//! store; the worker is the process that actually observes each
//! completion/failure/dead-letter, and `prismq-http` depends on this crate
//! already, so its `/metrics` scrape can gather the same registry in the
//! (common, single-binary-per-host) deployment where both link against it.

use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

pub static TASKS_COMPLETED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "prismq_tasks_completed_total",
        "tasks that reached completed, by type",
        &["type"]
    )
    .expect("metric registration")
});

pub static TASKS_FAILED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "prismq_tasks_failed_total",
        "attempts that ended in failed_retrying or failed_terminal, by type",
        &["type"]
    )
    .expect("metric registration")
});

pub static TASKS_DEAD_LETTERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "prismq_tasks_dead_lettered_total",
        "tasks that reached dead_letter, by type",
        &["type"]
    )
    .expect("metric registration")
});

/// Seconds from first claim (`started_utc`) to the commit that finished the
/// task, labeled by type and by how it finished. Buckets run from 10ms to
/// about 10 minutes, comfortably spanning typical retry/backoff caps.
pub static CLAIM_TO_COMPLETION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "prismq_claim_to_completion_seconds",
        "seconds from first claim to the commit that finished the task",
        &["type", "outcome"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0]
    )
    .expect("metric registration")
});
