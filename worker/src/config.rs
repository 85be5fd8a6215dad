// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Command-line / environment configuration for the worker binary.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

fn default_db_path() -> PathBuf {
    PathBuf::from("prismq-queue.db")
}

fn default_worker_id() -> String {
    format!("worker-{}", uuid::Uuid::new_v4().simple())
}

fn default_capabilities() -> String {
    "*".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_strategy() -> String {
    "priority".to_string()
}

fn default_lease_seconds() -> u64 {
    300
}

fn default_heartbeat_seconds() -> u64 {
    15
}

fn default_claim_backoff_base_ms() -> u64 {
    100
}

fn default_claim_backoff_cap_ms() -> u64 {
    5_000
}

fn default_shutdown_grace_seconds() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Default, Clone, Serialize, Deserialize, Debug, Parser)]
#[command(name = "prismq-worker", about = "PrismQ task queue worker process", long_about = None)]
#[serde(default)]
pub struct Cli {
    #[arg(long, require_equals = true, env = "PRISMQ_QUEUE_DB_PATH", default_value = "prismq-queue.db")]
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[arg(long, require_equals = true, env = "PRISMQ_WORKER_ID", default_value_t = default_worker_id())]
    #[serde(default = "default_worker_id")]
    /// Defaults to `worker-<random hex>` when unset, so multiple processes
    /// on the same host don't collide.
    pub worker_id: String,

    #[arg(long, require_equals = true, env = "PRISMQ_WORKER_CAPABILITIES", default_value = "*")]
    #[serde(default = "default_capabilities")]
    /// Comma-separated glob patterns, e.g. `sources.*,billing.**`.
    pub capabilities: String,

    #[arg(long, require_equals = true, env = "PRISMQ_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, require_equals = true, env = "PRISMQ_CONCURRENCY", default_value = "4")]
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[arg(long, require_equals = true, env = "PRISMQ_SCHEDULING_STRATEGY", default_value = "priority")]
    #[serde(default = "default_strategy")]
    /// One of `fifo`, `lifo`, `priority`, `weighted_random`.
    pub strategy: String,

    #[arg(long, require_equals = true, env = "PRISMQ_LEASE_SECONDS", default_value = "300")]
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u64,

    #[arg(long, require_equals = true, env = "PRISMQ_HEARTBEAT_SECONDS", default_value = "15")]
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,

    #[arg(long, require_equals = true, default_value = "100")]
    #[serde(default = "default_claim_backoff_base_ms")]
    pub claim_backoff_base_ms: u64,

    #[arg(long, require_equals = true, default_value = "5000")]
    #[serde(default = "default_claim_backoff_cap_ms")]
    pub claim_backoff_cap_ms: u64,

    #[arg(long, require_equals = true, default_value = "30")]
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,

    #[arg(long, require_equals = true)]
    /// Handler-registration manifest (JSON/YAML/TOML); validated against the
    /// compiled-in handler set at startup.
    pub handlers_config: Option<PathBuf>,

    #[arg(long, require_equals = true, env = "RUST_LOG", default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Cli {
    pub fn capability_list(&self) -> Vec<String> {
        self.capabilities
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn scheduling_strategy(&self) -> prismq_store::SchedulingStrategy {
        match self.strategy.to_lowercase().as_str() {
            "fifo" => prismq_store::SchedulingStrategy::Fifo,
            "lifo" => prismq_store::SchedulingStrategy::Lifo,
            "weighted_random" => prismq_store::SchedulingStrategy::WeightedRandom,
            _ => prismq_store::SchedulingStrategy::Priority,
        }
    }
}
