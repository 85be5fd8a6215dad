// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Command-line / environment configuration for the `prismq-server` binary,
//! covering the environment variables the HTTP surface reads on startup.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("prismq-queue.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rate_limit() -> u32 {
    600
}

fn default_retention_days() -> u64 {
    30
}

fn default_stale_threshold_secs() -> u64 {
    300
}

fn default_cleanup_threshold_secs() -> u64 {
    1800
}

fn default_backup_keep() -> usize {
    10
}

#[derive(Default, Clone, Serialize, Deserialize, Debug, Parser)]
#[command(name = "prismq-server", about = "PrismQ durable task queue HTTP surface", long_about = None)]
#[serde(default)]
pub struct Cli {
    #[arg(long, require_equals = true, env = "PRISMQ_BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    #[serde(default = "default_address")]
    /// Address the HTTP surface binds to.
    pub address: String,

    #[arg(long, require_equals = true, env = "PRISMQ_QUEUE_DB_PATH", default_value = "prismq-queue.db")]
    #[serde(default = "default_db_path")]
    /// Path to the single-file store (`PRISMQ_QUEUE_DB_PATH`).
    pub db_path: PathBuf,

    #[arg(long, require_equals = true, env = "PRISMQ_API_KEY", default_value = "")]
    /// Comma-separated keys, or a JSON `{name: key}` map. Empty disables auth.
    pub api_key: String,

    #[arg(long, require_equals = true, env = "PRISMQ_RATE_LIMIT_PER_MINUTE", default_value = "600")]
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    #[arg(long, require_equals = true, env = "RUST_LOG", default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[arg(long, require_equals = true)]
    /// Directory for rotating log files. Stdout only when unset.
    pub log_dir: Option<PathBuf>,

    #[arg(long, require_equals = true, default_value = "30")]
    #[serde(default = "default_retention_days")]
    /// Days to retain terminal-state tasks before cleanup.
    pub retention_days: u64,

    #[arg(long, require_equals = true, default_value = "300")]
    #[serde(default = "default_stale_threshold_secs")]
    /// Seconds of silence before a worker is considered stale.
    pub stale_threshold_secs: u64,

    #[arg(long, require_equals = true, default_value = "1800")]
    #[serde(default = "default_cleanup_threshold_secs")]
    /// Seconds of silence before a stale worker row is deleted.
    pub cleanup_threshold_secs: u64,

    #[arg(long, require_equals = true)]
    /// Directory backups are written to. Backups disabled when unset.
    pub backup_dir: Option<PathBuf>,

    #[arg(long, require_equals = true, default_value = "10")]
    #[serde(default = "default_backup_keep")]
    pub backup_keep: usize,
}

impl Cli {
    /// Merge a JSON config file over the parsed CLI/env values: file values
    /// fill in anything not already set on the command line.
    pub fn merge_from_file(&mut self, path: &std::path::Path) -> anyhow::Result<()> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let mut config: serde_json::Value = serde_json::from_reader(reader)?;
        let this = serde_json::to_value(&self)?;
        merge(&mut config, &this);
        *self = serde_json::from_value(config)?;
        Ok(())
    }
}

fn merge(a: &mut serde_json::Value, b: &serde_json::Value) {
    match (a, b) {
        (serde_json::Value::Object(a), serde_json::Value::Object(b)) => {
            for (k, v) in b {
                merge(a.entry(k.clone()).or_insert(serde_json::Value::Null), v);
            }
        }
        (a, b) if !b.is_null() => *a = b.clone(),
        _ => {}
    }
}
