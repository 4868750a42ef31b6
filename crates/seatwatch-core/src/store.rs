//! Persistence capabilities the watch pipeline is built against
//!
//! Implemented by `seatwatch-store` on SQLite; tests and alternative backends
//! can provide their own.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

use crate::types::{Lesson, LessonKey, NewWatch, PendingWatch, UpstreamCredential};

/// Watch entries and their lifecycle.
pub trait WatchStore: Send + Sync {
    /// All entries with `notified = false`, joined with lesson and push address.
    fn pending_watches(&self) -> Result<Vec<PendingWatch>>;

    /// Create an entry, or update the existing one for the same
    /// (user, lesson) pair. Returns the entry id.
    fn upsert_watch(&self, watch: &NewWatch) -> Result<i64>;

    /// Idempotent.
    fn mark_notified(&self, entry_id: i64) -> Result<()>;

    fn delete_watch(&self, entry_id: i64) -> Result<bool>;

    /// Delete every entry whose lesson date is strictly before `today`,
    /// notified or not. Returns the number of deleted entries.
    fn delete_watches_before(&self, today: NaiveDate) -> Result<usize>;
}

/// The lesson catalog.
pub trait LessonStore: Send + Sync {
    /// Insert or refresh a lesson keyed by [`LessonKey`]. Returns its id.
    fn upsert_lesson(&self, lesson: &Lesson) -> Result<i64>;

    /// Patch availability of every lesson matching `key` exactly.
    /// Returns the number of rows touched (0 when nothing matched).
    fn patch_availability(&self, key: &LessonKey, available_slots: u32) -> Result<usize>;
}

/// Sealed upstream session as stored: encrypted JSON plus its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSession {
    pub sealed: String,
    pub expires_at: DateTime<Utc>,
}

/// Encrypted upstream credentials, the lockout breaker and cached sessions.
pub trait CredentialStore: Send + Sync {
    fn credential(&self, user_id: &str) -> Result<Option<UpstreamCredential>>;

    /// Store new credentials and close the breaker (`auth_valid = true`).
    /// This is the re-link event.
    fn link_credential(&self, user_id: &str, email_encrypted: &str, password_encrypted: &str)
    -> Result<()>;

    /// Open the breaker (`auth_valid = false`).
    fn invalidate_credential(&self, user_id: &str) -> Result<()>;

    /// Replace the cached session of a user wholesale.
    fn save_session(&self, user_id: &str, session: &SealedSession) -> Result<()>;

    fn load_session(&self, user_id: &str) -> Result<Option<SealedSession>>;

    /// Idempotent.
    fn clear_session(&self, user_id: &str) -> Result<()>;
}
