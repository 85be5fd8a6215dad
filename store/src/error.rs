// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use rusqlite::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store is busy, retry later")]
    Busy,

    #[error("schema error: {0}")]
    Schema(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("store is corrupt: {0}")]
    Corruption(String),

    #[error("task {0} not found")]
    NotFound(i64),

    #[error("invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: i64,
        from: String,
        to: String,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Classify a raw sqlite error onto our error kinds, falling back to a
    /// plain wrap for anything that isn't busy/constraint/corruption.
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, ref msg) = err {
            return match e.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreError::Busy,
                ErrorCode::ConstraintViolation => {
                    StoreError::IntegrityViolation(msg.clone().unwrap_or_default())
                }
                ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt => {
                    StoreError::Corruption(msg.clone().unwrap_or_default())
                }
                _ => StoreError::Sqlite(err),
            };
        }
        StoreError::Sqlite(err)
    }
}
