// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Offline/operator tool wrapping the maintenance and monitoring operations
//! in `prismq-store`: checkpoint, analyze, vacuum, integrity-check,
//! optimize, cleanup, backup, lease reclamation, and a JSON stats dump.
//! Safe to run against a database a worker or server process is also
//! writing to: every operation here goes through the same `Store` locking
//! and transaction machinery the worker and HTTP processes use.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use clap::{Parser, Subcommand};
use prismq_store::{CheckpointMode, Store, StoreError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "queue-cli", about = "Maintenance and inspection tool for a PrismQ queue database")]
struct Cli {
    #[arg(long, require_equals = true, env = "PRISMQ_QUEUE_DB_PATH", default_value = "prismq-queue.db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Flush the write-ahead log
    Checkpoint {
        #[arg(long, default_value = "passive")]
        mode: String,
    },
    /// Refresh query-planner statistics
    Analyze,
    /// Reclaim free pages; blocks writers for the duration
    Vacuum,
    /// Run PRAGMA integrity_check and report any problems
    IntegrityCheck,
    /// Analyze, and vacuum too with --full
    Optimize {
        #[arg(long)]
        full: bool,
    },
    /// Delete terminal-state tasks older than --retention-days
    Cleanup {
        #[arg(long, default_value = "30")]
        retention_days: u64,
    },
    /// Online backup to a directory, pruning beyond --keep
    Backup {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value = "10")]
        keep: usize,
    },
    /// Reclaim tasks whose lease expired without a heartbeat
    ReclaimLeases,
    /// Drop workers that haven't heartbeat within --stale-after-secs
    PruneWorkers {
        #[arg(long, default_value = "300")]
        stale_after_secs: u64,
    },
    /// Print queue depth, recent failures, and worker activity as JSON
    Stats,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let store = match Store::open(&cli.db_path) {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, path = %cli.db_path.display(), "failed to open store");
            return ExitCode::from(2);
        }
    };

    let outcome = match cli.command {
        Command::Checkpoint { mode } => run_checkpoint(&store, &mode),
        Command::Analyze => store.analyze().map(|()| true),
        Command::Vacuum => store.vacuum().map(|()| true),
        Command::IntegrityCheck => run_integrity_check(&store),
        Command::Optimize { full } => store.optimize(full).map(|()| true),
        Command::Cleanup { retention_days } => run_cleanup(&store, retention_days),
        Command::Backup { dir, keep } => run_backup(&store, &dir, keep),
        Command::ReclaimLeases => run_reclaim_leases(&store),
        Command::PruneWorkers { stale_after_secs } => run_prune_workers(&store, stale_after_secs),
        Command::Stats => run_stats(&store),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::from(1)
        }
    }
}

fn run_checkpoint(store: &Store, mode: &str) -> Result<bool, StoreError> {
    let mode = match mode.to_lowercase().as_str() {
        "full" => CheckpointMode::Full,
        "truncate" => CheckpointMode::Truncate,
        _ => CheckpointMode::Passive,
    };
    store.checkpoint(mode)?;
    Ok(true)
}

fn run_integrity_check(store: &Store) -> Result<bool, StoreError> {
    let report = store.integrity_check()?;
    if report.is_ok() {
        info!("integrity check: ok");
    } else {
        for message in &report.messages {
            error!(message = %message, "integrity check problem");
        }
    }
    Ok(report.is_ok())
}

fn run_cleanup(store: &Store, retention_days: u64) -> Result<bool, StoreError> {
    let deleted = store.cleanup_old_tasks(Duration::from_secs(retention_days * 24 * 3600))?;
    info!(deleted, "cleaned up old terminal tasks");
    Ok(true)
}

fn run_backup(store: &Store, dir: &Path, keep: usize) -> Result<bool, StoreError> {
    let report = store.backup_to(dir, keep)?;
    if report.verified {
        info!(path = %report.path.display(), "backup written and verified");
    } else {
        error!(path = %report.path.display(), "backup written but failed verification");
    }
    Ok(report.verified)
}

fn run_reclaim_leases(store: &Store) -> Result<bool, StoreError> {
    let reclaimed = store.reclaim_stale_leases()?;
    info!(reclaimed, "reclaimed stale leases");
    Ok(true)
}

fn run_prune_workers(store: &Store, stale_after_secs: u64) -> Result<bool, StoreError> {
    let pruned = store.prune_stale_workers(Duration::from_secs(stale_after_secs))?;
    info!(pruned, "pruned stale workers");
    Ok(true)
}

fn run_stats(store: &Store) -> Result<bool, StoreError> {
    let depth_by_status = store.queue_depth_by_status()?;
    let depth_by_type = store.queue_depth_by_type()?;
    let recent_failures = store.recent_failures(20)?;
    let workers = store.worker_activity()?;

    let output = serde_json::json!({
        "depth_by_status": depth_by_status,
        "depth_by_type": depth_by_type,
        "recent_failures": recent_failures,
        "workers": workers,
    });
    println!("{}", serde_json::to_string_pretty(&output).expect("json serialization never fails here"));
    Ok(true)
}
