// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Background maintenance ticks, run on independent schedules against the
//! store. Hosted inside `prismq-server` since it's the long-lived
//! always-on process; the worker binary only claims and executes tasks.

use std::{path::PathBuf, time::Duration};

use prismq_store::Store;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct MaintenanceConfig {
    pub stale_lease_interval: Duration,
    pub stale_worker_threshold: Duration,
    pub cleanup_interval: Duration,
    pub retention: Duration,
    pub backup_interval: Duration,
    pub backup_dir: Option<PathBuf>,
    pub backup_keep: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            stale_lease_interval: Duration::from_secs(30),
            stale_worker_threshold: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(3600),
            retention: Duration::from_secs(30 * 24 * 3600),
            backup_interval: Duration::from_secs(6 * 3600),
            backup_dir: None,
            backup_keep: 10,
        }
    }
}

/// Run every maintenance tick until `shutdown` fires. Each tick logs and
/// moves on rather than aborting the loop on a single failed pass, since a
/// transient `Busy` shouldn't take down the whole scheduler.
pub async fn run(store: Store, config: MaintenanceConfig, shutdown: CancellationToken) {
    let mut reclaim_tick = tokio::time::interval(config.stale_lease_interval);
    let mut cleanup_tick = tokio::time::interval(config.cleanup_interval);
    let mut backup_tick = tokio::time::interval(config.backup_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("maintenance scheduler shutting down");
                return;
            }
            _ = reclaim_tick.tick() => {
                reclaim_pass(&store, &config);
            }
            _ = cleanup_tick.tick() => {
                cleanup_pass(&store, &config);
            }
            _ = backup_tick.tick() => {
                backup_pass(&store, &config);
            }
        }
    }
}

fn reclaim_pass(store: &Store, config: &MaintenanceConfig) {
    match store.reclaim_stale_leases() {
        Ok(n) if n > 0 => {
            crate::metrics::LEASE_RECLAIMS.inc_by(n);
            info!(reclaimed = n, "reclaimed stale leases");
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "stale lease reclamation failed"),
    }
    match store.prune_stale_workers(config.stale_worker_threshold) {
        Ok(n) if n > 0 => info!(pruned = n, "pruned stale workers"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "stale worker pruning failed"),
    }
}

fn cleanup_pass(store: &Store, config: &MaintenanceConfig) {
    match store.cleanup_old_tasks(config.retention) {
        Ok(n) if n > 0 => info!(deleted = n, "cleaned up old terminal tasks"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "old task cleanup failed"),
    }
    if let Err(err) = store.checkpoint(prismq_store::CheckpointMode::Passive) {
        warn!(error = %err, "wal checkpoint failed");
    }
}

fn backup_pass(store: &Store, config: &MaintenanceConfig) {
    let Some(dir) = &config.backup_dir else {
        return;
    };
    match store.backup_to(dir, config.backup_keep) {
        Ok(report) if report.verified => info!(path = %report.path.display(), "backup written and verified"),
        Ok(report) => warn!(path = %report.path.display(), "backup written but failed verification"),
        Err(err) => error!(error = %err, "backup failed"),
    }
}
