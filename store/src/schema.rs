// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Bootstrap DDL. Applied once, inside `Store::open`, guarded by
//! `CREATE TABLE IF NOT EXISTS` so opening an existing file is idempotent.

pub const SCHEMA_VERSION: i64 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    type            TEXT NOT NULL,
    priority        INTEGER NOT NULL DEFAULT 100,
    payload         TEXT NOT NULL DEFAULT '{}',
    compatibility   TEXT NOT NULL DEFAULT '{}',
    status          TEXT NOT NULL DEFAULT 'queued',
    attempts        INTEGER NOT NULL DEFAULT 0,
    max_attempts    INTEGER NOT NULL DEFAULT 3,
    locked_by       TEXT,
    lease_until_utc TEXT,
    run_after_utc   TEXT NOT NULL,
    created_utc     TEXT NOT NULL,
    updated_utc     TEXT NOT NULL,
    started_utc     TEXT,
    finished_utc    TEXT,
    error_message   TEXT,
    idempotency_key TEXT,
    result          TEXT,
    client_id       TEXT,
    cancel_requested INTEGER NOT NULL DEFAULT 0,
    region          TEXT GENERATED ALWAYS AS (json_extract(compatibility, '$.region')) VIRTUAL,
    format          TEXT GENERATED ALWAYS AS (json_extract(payload, '$.format')) VIRTUAL,
    CHECK (status IN ('queued','leased','completed','failed_retrying','failed_terminal','dead_letter','cancelled')),
    CHECK (attempts >= 0),
    CHECK (max_attempts >= 1)
);

CREATE TABLE IF NOT EXISTS workers (
    id              TEXT PRIMARY KEY,
    capabilities    TEXT NOT NULL DEFAULT '[]',
    heartbeat_utc   TEXT NOT NULL,
    registered_utc  TEXT NOT NULL,
    client_id       TEXT
);

CREATE TABLE IF NOT EXISTS task_logs (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id   INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    at_utc    TEXT NOT NULL,
    level     TEXT NOT NULL DEFAULT 'info',
    message   TEXT NOT NULL,
    details   TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_claim ON tasks(status, priority, run_after_utc);
CREATE INDEX IF NOT EXISTS idx_tasks_type_status ON tasks(type, status);
CREATE INDEX IF NOT EXISTS idx_tasks_lease ON tasks(status, lease_until_utc);
CREATE INDEX IF NOT EXISTS idx_tasks_client ON tasks(client_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_idempotency
    ON tasks(idempotency_key) WHERE idempotency_key IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_task_logs_task ON task_logs(task_id, at_utc);
CREATE INDEX IF NOT EXISTS idx_workers_heartbeat ON workers(heartbeat_utc);
"#;

/// Plain SQL views backing the cheap monitoring queries (C8). Anything that
/// needs percentile math is computed in `monitoring.rs` instead, since
/// SQLite has no native `PERCENTILE_CONT`.
pub const CREATE_VIEWS: &str = r#"
CREATE VIEW IF NOT EXISTS queue_depth_by_status AS
    SELECT status, COUNT(*) AS depth
    FROM tasks
    GROUP BY status;

CREATE VIEW IF NOT EXISTS queue_depth_by_type AS
    SELECT type, status, COUNT(*) AS depth
    FROM tasks
    GROUP BY type, status;

CREATE VIEW IF NOT EXISTS recent_failures AS
    SELECT id, type, attempts, max_attempts, status, error_message, updated_utc
    FROM tasks
    WHERE status IN ('failed_terminal', 'dead_letter')
    ORDER BY updated_utc DESC
    LIMIT 100;

CREATE VIEW IF NOT EXISTS worker_activity AS
    SELECT
        w.id AS worker_id,
        w.heartbeat_utc,
        (SELECT COUNT(*) FROM tasks t WHERE t.locked_by = w.id AND t.status = 'leased') AS active_leases
    FROM workers w;
"#;
