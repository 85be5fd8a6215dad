// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Scheduled upkeep operations (C9): checkpoint, analyze, vacuum,
//! integrity-check, backup, and retention cleanup. Each runs under its own
//! transaction where the underlying SQLite statement allows one; `VACUUM`
//! and checkpoint cannot run inside a transaction, so those two borrow the
//! connection directly.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::{error::StoreError, store::Store};

/// Checkpoint mode, mapped onto SQLite's `PRAGMA wal_checkpoint(<mode>)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointMode {
    Passive,
    Full,
    Truncate,
}

impl CheckpointMode {
    fn as_sql(&self) -> &'static str {
        match self {
            CheckpointMode::Passive => "PASSIVE",
            CheckpointMode::Full => "FULL",
            CheckpointMode::Truncate => "TRUNCATE",
        }
    }
}

/// Diagnostics from `PRAGMA integrity_check`. `is_ok()` is true when the
/// check returned the single `"ok"` row SQLite uses to mean healthy.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub messages: Vec<String>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.messages.len() == 1 && self.messages[0] == "ok"
    }
}

/// Result of an online backup: the file written and whether it passed its
/// own integrity-check when reopened read-only.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub path: PathBuf,
    pub verified: bool,
}

impl Store {
    /// Truncate (or passively/fully flush) the write-ahead log.
    pub fn checkpoint(&self, mode: CheckpointMode) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                &format!("PRAGMA wal_checkpoint({})", mode.as_sql()),
                [],
                |_| Ok(()),
            )
            .map_err(StoreError::from_sqlite)?;
        info!(mode = ?mode, "checkpoint complete");
        Ok(())
    }

    /// Refresh the query planner's statistics. Non-blocking: readers and
    /// writers may proceed concurrently.
    pub fn analyze(&self) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute_batch("ANALYZE;")
            .map_err(StoreError::from_sqlite)?;
        info!("analyze complete");
        Ok(())
    }

    /// Reclaim free pages. Blocks all writers for the duration; callers
    /// should schedule this in a low-traffic window.
    pub fn vacuum(&self) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .execute_batch("VACUUM;")
            .map_err(StoreError::from_sqlite)?;
        info!("vacuum complete");
        Ok(())
    }

    /// `PRAGMA integrity_check`. A healthy store returns exactly `["ok"]`.
    pub fn integrity_check(&self) -> Result<IntegrityReport, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare("PRAGMA integrity_check")
            .map_err(StoreError::from_sqlite)?;
        let messages: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(StoreError::from_sqlite)?
            .collect::<Result<_, _>>()
            .map_err(StoreError::from_sqlite)?;
        if messages.iter().any(|m| m != "ok") {
            warn!(?messages, "integrity check reported problems");
        }
        Ok(IntegrityReport { messages })
    }

    /// Analyze only (`full = false`), or analyze + vacuum (`full = true`).
    pub fn optimize(&self, full: bool) -> Result<(), StoreError> {
        self.analyze()?;
        if full {
            self.vacuum()?;
        }
        Ok(())
    }

    /// Delete terminal-state tasks older than `retention`; `task_logs` rows
    /// cascade via the foreign key. Returns the number of tasks deleted.
    pub fn cleanup_old_tasks(&self, retention: Duration) -> Result<u64, StoreError> {
        self.with_transaction(|tx| {
            let cutoff: DateTime<Utc> = Utc::now() - ChronoDuration::from_std(retention).unwrap_or_default();
            let affected = tx
                .execute(
                    "DELETE FROM tasks
                     WHERE status IN ('completed', 'failed_terminal', 'dead_letter', 'cancelled')
                       AND updated_utc < ?1",
                    rusqlite::params![cutoff],
                )
                .map_err(StoreError::from_sqlite)?;
            Ok(affected as u64)
        })
    }

    /// Online backup to `path`: uses SQLite's backup API so it runs against
    /// a live store without blocking writers for more than one page copy at
    /// a time. Verifies the copy by reopening it read-only and running
    /// `integrity_check`, then prunes old backups beyond `keep`.
    pub fn backup_to(&self, dir: impl AsRef<Path>, keep: usize) -> Result<BackupReport, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let filename = format!("queue-{}.bak", Utc::now().format("%Y%m%d-%H%M%S"));
        let path = dir.join(filename);

        {
            let guard = self.lock()?;
            let mut dst = Connection::open(&path).map_err(StoreError::from_sqlite)?;
            let backup = rusqlite::backup::Backup::new(&guard, &mut dst).map_err(StoreError::from_sqlite)?;
            backup
                .run_to_completion(100, Duration::from_millis(10), None)
                .map_err(StoreError::from_sqlite)?;
        }

        let verified = verify_backup(&path).unwrap_or(false);
        prune_old_backups(dir, keep)?;

        info!(path = %path.display(), verified, "backup complete");
        Ok(BackupReport { path, verified })
    }
}

fn verify_backup(path: &Path) -> Result<bool, StoreError> {
    let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(StoreError::from_sqlite)?;
    let mut stmt = conn
        .prepare("PRAGMA integrity_check")
        .map_err(StoreError::from_sqlite)?;
    let messages: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .map_err(StoreError::from_sqlite)?
        .collect::<Result<_, _>>()
        .map_err(StoreError::from_sqlite)?;
    Ok(messages.len() == 1 && messages[0] == "ok")
}

fn prune_old_backups(dir: &Path, keep: usize) -> Result<(), StoreError> {
    let mut backups: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("queue-") && n.ends_with(".bak"))
                .unwrap_or(false)
        })
        .collect();
    backups.sort();
    if backups.len() > keep {
        for stale in &backups[..backups.len() - keep] {
            let _ = fs::remove_file(stale);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTask;

    #[test]
    fn integrity_check_reports_ok_on_fresh_store() {
        let store = Store::open_in_memory().unwrap();
        let report = store.integrity_check().unwrap();
        assert!(report.is_ok());
    }

    #[test]
    fn optimize_full_runs_analyze_and_vacuum() {
        let store = Store::open_in_memory().unwrap();
        store.optimize(true).unwrap();
    }

    #[test]
    fn cleanup_deletes_only_old_terminal_tasks() {
        let store = Store::open_in_memory().unwrap();
        let task = store
            .enqueue(NewTask {
                task_type: "t.ok".into(),
                ..Default::default()
            })
            .unwrap()
            .into_task();
        store.cancel_task(task.id).unwrap();

        let deleted = store.cleanup_old_tasks(Duration::from_secs(3600)).unwrap();
        assert_eq!(deleted, 0, "a task cancelled moments ago is within retention");

        let deleted = store.cleanup_old_tasks(Duration::from_secs(0)).unwrap();
        assert_eq!(deleted, 1);
    }

    #[test]
    fn backup_writes_a_verified_file() {
        let store = Store::open_in_memory().unwrap();
        store
            .enqueue(NewTask {
                task_type: "t.ok".into(),
                ..Default::default()
            })
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let report = store.backup_to(dir.path(), 10).unwrap();
        assert!(report.path.exists());
        assert!(report.verified);
    }

    #[test]
    fn backup_prunes_beyond_keep_count() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        for _ in 0..3 {
            store.backup_to(dir.path(), 1).unwrap();
            std::thread::sleep(Duration::from_millis(1100));
        }
        let count = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
    }
}
