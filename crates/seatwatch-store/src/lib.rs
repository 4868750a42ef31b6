//! SQLite persistence for lessons, watch entries, credentials and sessions
//!
//! [`SqliteStore`] implements every store trait of `seatwatch-core` over a
//! single connection guarded by a mutex.

mod credentials;
mod lessons;
mod schema;
mod watches;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use rusqlite::Connection;
use rusqlite::types::Type;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        info!("Opened database at {:?}", path);
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        schema::init(&conn)?;
        debug!("Database schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Set (or clear) the push address of a user.
    pub fn set_notify_address(&self, user_id: &str, address: Option<&str>) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO users (id, notify_address) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET notify_address = excluded.notify_address",
                rusqlite::params![user_id, address],
            )
            .context("Failed to set notify address")?;
        Ok(())
    }
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}


#[cfg(test)]
mod tests {
    use super::*;
    use seatwatch_core::WatchStore;

    #[test]
    fn test_open_creates_file_and_parent() -> Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("nested").join("seatwatch.db");
        {
            let store = SqliteStore::open(&path)?;
            store.set_notify_address("u1", Some("line-u1"))?;
        }
        assert!(path.exists());

        // Re-opening keeps data and does not fail on the existing schema.
        let store = SqliteStore::open(&path)?;
        assert!(store.pending_watches()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date(0, "2026-10-16").is_ok());
        assert!(parse_date(0, "16/10/2026").is_err());
    }
}
