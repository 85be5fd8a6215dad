// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Owns the single SQLite connection backing the queue and applies the
//! pragma tuning and bootstrap DDL on open.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use rusqlite::{Connection, Transaction};
use tracing::info;

use crate::{
    error::StoreError,
    schema::{CREATE_TABLES, CREATE_VIEWS, SCHEMA_VERSION},
};

/// A single-file task queue store. Cheap to clone: internally an `Arc`.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Store {
    /// Open the store at `path`, creating and bootstrapping the schema if it
    /// doesn't exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(StoreError::from_sqlite)?;
        Self::tune(&conn)?;
        Self::bootstrap(&conn)?;
        info!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Open an in-memory store. Useful for tests; never durable across process exit.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::from_sqlite)?;
        Self::tune(&conn)?;
        Self::bootstrap(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    fn tune(conn: &Connection) -> Result<(), StoreError> {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(StoreError::from_sqlite)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(StoreError::from_sqlite)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(StoreError::from_sqlite)?;
        conn.pragma_update(None, "temp_store", "MEMORY")
            .map_err(StoreError::from_sqlite)?;
        conn.pragma_update(None, "busy_timeout", 5_000i64)
            .map_err(StoreError::from_sqlite)?;
        conn.pragma_update(None, "mmap_size", 128 * 1024 * 1024i64)
            .map_err(StoreError::from_sqlite)?;
        conn.pragma_update(None, "cache_size", -20_000i64)
            .map_err(StoreError::from_sqlite)?;
        conn.pragma_update(None, "wal_autocheckpoint", 1_000i64)
            .map_err(StoreError::from_sqlite)?;
        Ok(())
    }

    fn bootstrap(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        conn.execute_batch(CREATE_VIEWS)
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        conn.execute(
            "INSERT INTO schema_meta(key, value) VALUES ('schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![SCHEMA_VERSION.to_string()],
        )
        .map_err(|e| StoreError::Schema(e.to_string()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Busy)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction: commits on `Ok`, rolls
    /// back on `Err`. This is the only way any component other than the
    /// schema bootstrap touches the database, so every multi-statement
    /// mutation is atomic.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut guard = self.lock()?;
        let tx = guard
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .map_err(StoreError::from_sqlite)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(StoreError::from_sqlite)?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_bootstraps_in_memory() {
        let store = Store::open_in_memory().unwrap();
        let guard = store.lock().unwrap();
        let count: i64 = guard
            .query_row("SELECT COUNT(*) FROM tasks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn open_on_disk_is_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        {
            let _store = Store::open(&path).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<(), StoreError> = store.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO workers(id, heartbeat_utc, registered_utc) VALUES ('w1', '2026-01-01', '2026-01-01')",
                [],
            )
            .map_err(StoreError::from_sqlite)?;
            Err(StoreError::Busy)
        });
        assert!(result.is_err());

        let guard = store.lock().unwrap();
        let count: i64 = guard
            .query_row("SELECT COUNT(*) FROM workers", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
