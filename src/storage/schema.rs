//! SQLite DDL for the agent store
//!
//! Every statement uses `IF NOT EXISTS` so `apply_schema` is idempotent.
//! Timestamps are stored as epoch milliseconds.

use rusqlite::Connection;

pub(crate) const SCHEMA_SQL: &str = r#"
-- Singleton row (id = 1) with the agent lifecycle counters.
CREATE TABLE IF NOT EXISTS agent_state (
    id                    INTEGER PRIMARY KEY CHECK (id = 1),
    state                 TEXT NOT NULL,
    last_wakeup           INTEGER,
    last_sleep            INTEGER,
    tasks_completed_today INTEGER NOT NULL DEFAULT 0,
    last_daily_reset      TEXT NOT NULL,        -- YYYY-MM-DD, local date
    updated_at            INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id                       TEXT PRIMARY KEY,
    type                     TEXT NOT NULL,
    title                    TEXT NOT NULL,
    description              TEXT NOT NULL DEFAULT '',
    priority                 INTEGER NOT NULL,
    status                   TEXT NOT NULL,
    scheduled_time           INTEGER,
    recurring                INTEGER NOT NULL DEFAULT 0,
    recurrence_interval_secs INTEGER,
    target_file              TEXT,
    context                  TEXT NOT NULL DEFAULT 'null',   -- JSON
    result                   TEXT,
    error                    TEXT,
    created_at               INTEGER NOT NULL,
    started_at               INTEGER,
    completed_at             INTEGER,
    execution_time_ms        INTEGER
);

CREATE INDEX IF NOT EXISTS idx_tasks_queue ON tasks(status, priority DESC, created_at);

CREATE TABLE IF NOT EXISTS wakeup_triggers (
    id                TEXT PRIMARY KEY,
    type              TEXT NOT NULL,
    name              TEXT NOT NULL,
    enabled           INTEGER NOT NULL DEFAULT 1,
    scheduled_time    INTEGER,
    interval_secs     INTEGER,
    last_triggered_at INTEGER,
    priority          INTEGER NOT NULL,
    reason            TEXT NOT NULL DEFAULT '',
    schedule_slot     TEXT,                 -- morning | evening
    data_threshold    INTEGER
);

-- Singleton row (id = 1) so schedule edits survive restarts.
CREATE TABLE IF NOT EXISTS wakeup_schedule (
    id              INTEGER PRIMARY KEY CHECK (id = 1),
    enabled         INTEGER NOT NULL,
    morning_time    TEXT NOT NULL,          -- HH:MM
    evening_time    TEXT NOT NULL,          -- HH:MM
    active_weekdays TEXT NOT NULL           -- JSON array, 0 = Monday
);
"#;

/// Apply the full schema to an open connection
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
