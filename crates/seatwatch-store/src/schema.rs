use anyhow::{Context, Result};
use rusqlite::Connection;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS lessons (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    program_name TEXT NOT NULL,
    instructor TEXT NOT NULL,
    store TEXT NOT NULL,
    sid_hash TEXT NOT NULL,
    available_slots INTEGER NOT NULL DEFAULT 0,
    is_full INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_lessons_key
    ON lessons (date, start_time, store, instructor);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    notify_address TEXT
);

CREATE TABLE IF NOT EXISTS watch_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    lesson_id INTEGER NOT NULL REFERENCES lessons (id) ON DELETE CASCADE,
    notified INTEGER NOT NULL DEFAULT 0,
    auto_reserve INTEGER NOT NULL DEFAULT 0,
    preferred_seats TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, lesson_id)
);

CREATE INDEX IF NOT EXISTS idx_watch_entries_pending
    ON watch_entries (notified);

CREATE TABLE IF NOT EXISTS upstream_credentials (
    user_id TEXT PRIMARY KEY,
    email_encrypted TEXT NOT NULL,
    password_encrypted TEXT NOT NULL,
    auth_valid INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS upstream_sessions (
    user_id TEXT PRIMARY KEY,
    sealed TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
"#;

pub(crate) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Failed to initialize database schema")
}
