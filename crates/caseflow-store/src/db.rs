//! SQLite connection setup and schema bootstrap
//!
//! The store opens two connections against the same database file: a write
//! connection handed to the write-queue task, and a read connection shared
//! by every reader. WAL mode lets the readers proceed while the writer
//! commits.

use crate::error::StoreError;
use rusqlite::Connection;
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS work_items (
    item_id         TEXT PRIMARY KEY,
    entity_key      TEXT NOT NULL,
    scheduled_date  TEXT NOT NULL,
    item_type       TEXT NOT NULL,
    parties         TEXT NOT NULL DEFAULT '[]',
    created_at      TEXT NOT NULL,
    UNIQUE (entity_key, scheduled_date, item_type)
);

CREATE TABLE IF NOT EXISTS item_status (
    item_id         TEXT PRIMARY KEY REFERENCES work_items(item_id),
    pipeline_status TEXT NOT NULL DEFAULT 'pending',
    current_step    INTEGER,
    last_error      TEXT,
    error_step      INTEGER,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    completed_at    TEXT,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_item_status_claim
    ON item_status (pipeline_status, retry_count);

CREATE TABLE IF NOT EXISTS step_status (
    item_id      TEXT NOT NULL REFERENCES work_items(item_id),
    step_number  INTEGER NOT NULL,
    step_name    TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    PRIMARY KEY (item_id, step_number)
);

CREATE TABLE IF NOT EXISTS entities (
    entity_key         TEXT PRIMARY KEY,
    canonical_key      TEXT,
    owner_name         TEXT,
    situs_address      TEXT,
    tax_json           TEXT,
    flood_json         TEXT,
    registry_json      TEXT,
    survey_json        TEXT,
    analysis_json      TEXT,
    valuation_json     TEXT,
    last_analyzed_item TEXT,
    analyzed_at        TEXT,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_key TEXT NOT NULL,
    doc_ref    TEXT NOT NULL,
    payload    TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    UNIQUE (entity_key, doc_ref)
);

CREATE TABLE IF NOT EXISTS liens (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_key TEXT NOT NULL,
    doc_ref    TEXT NOT NULL,
    payload    TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    UNIQUE (entity_key, doc_ref)
);

CREATE TABLE IF NOT EXISTS permits (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_key TEXT NOT NULL,
    permit_no  TEXT NOT NULL,
    payload    TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    UNIQUE (entity_key, permit_no)
);

CREATE TABLE IF NOT EXISTS market_listings (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_key TEXT NOT NULL,
    source     TEXT NOT NULL,
    payload    TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    UNIQUE (entity_key, source)
);
";

/// Open a connection with the pragmas every caseflow connection uses
pub(crate) fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5_000)?;
    Ok(conn)
}

/// Create all tables if absent. Idempotent; runs on every open.
pub(crate) fn bootstrap(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_connection(&dir.path().join("case.db")).unwrap();
        bootstrap(&conn).unwrap();
        bootstrap(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'entities'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
