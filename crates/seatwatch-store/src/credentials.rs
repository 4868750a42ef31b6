use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, params};
use seatwatch_core::{CredentialStore, SealedSession, UpstreamCredential};
use tracing::{info, warn};

use crate::{SqliteStore, now_rfc3339};

impl CredentialStore for SqliteStore {
    fn credential(&self, user_id: &str) -> Result<Option<UpstreamCredential>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT user_id, email_encrypted, password_encrypted, auth_valid
             FROM upstream_credentials WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UpstreamCredential {
                    user_id: row.get(0)?,
                    email_encrypted: row.get(1)?,
                    password_encrypted: row.get(2)?,
                    auth_valid: row.get(3)?,
                })
            },
        )
        .optional()
        .context("Failed to load upstream credential")
    }

    fn link_credential(
        &self,
        user_id: &str,
        email_encrypted: &str,
        password_encrypted: &str,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO upstream_credentials
                 (user_id, email_encrypted, password_encrypted, auth_valid, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 email_encrypted = excluded.email_encrypted,
                 password_encrypted = excluded.password_encrypted,
                 auth_valid = 1,
                 updated_at = excluded.updated_at",
            params![user_id, email_encrypted, password_encrypted, now_rfc3339()],
        )
        .context("Failed to store upstream credential")?;
        // A session from the previous account must not outlive the re-link.
        tx.execute(
            "DELETE FROM upstream_sessions WHERE user_id = ?1",
            params![user_id],
        )
        .context("Failed to drop cached session")?;
        tx.commit().context("Failed to commit credential link")?;

        info!(user_id, "Upstream account linked");
        Ok(())
    }

    fn invalidate_credential(&self, user_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE upstream_credentials SET auth_valid = 0, updated_at = ?2 WHERE user_id = ?1",
            params![user_id, now_rfc3339()],
        )
        .context("Failed to invalidate upstream credential")?;
        conn.execute(
            "DELETE FROM upstream_sessions WHERE user_id = ?1",
            params![user_id],
        )
        .context("Failed to drop cached session")?;

        warn!(user_id, "Upstream credential marked invalid");
        Ok(())
    }

    fn save_session(&self, user_id: &str, session: &SealedSession) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO upstream_sessions (user_id, sealed, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     sealed = excluded.sealed,
                     expires_at = excluded.expires_at",
                params![user_id, session.sealed, session.expires_at.to_rfc3339()],
            )
            .context("Failed to save upstream session")?;
        Ok(())
    }

    fn load_session(&self, user_id: &str) -> Result<Option<SealedSession>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT sealed, expires_at FROM upstream_sessions WHERE user_id = ?1",
            params![user_id],
            |row| {
                let expires_at: String = row.get(1)?;
                let expires_at = DateTime::parse_from_rfc3339(&expires_at)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc);
                Ok(SealedSession {
                    sealed: row.get(0)?,
                    expires_at,
                })
            },
        )
        .optional()
        .context("Failed to load upstream session")
    }

    fn clear_session(&self, user_id: &str) -> Result<()> {
        self.conn()?
            .execute(
                "DELETE FROM upstream_sessions WHERE user_id = ?1",
                params![user_id],
            )
            .context("Failed to drop cached session")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_breaker_flips_and_relink_resets() -> Result<()> {
        let store = SqliteStore::open_in_memory()?;
        assert!(store.credential("u1")?.is_none());

        store.link_credential("u1", "enc-email", "enc-pw")?;
        assert!(store.credential("u1")?.unwrap().auth_valid);

        store.invalidate_credential("u1")?;
        store.invalidate_credential("u1")?;
        let credential = store.credential("u1")?.unwrap();
        assert!(!credential.auth_valid);
        assert_eq!(credential.email_encrypted, "enc-email");

        store.link_credential("u1", "enc-email-2", "enc-pw-2")?;
        let credential = store.credential("u1")?.unwrap();
        assert!(credential.auth_valid);
        assert_eq!(credential.password_encrypted, "enc-pw-2");
        Ok(())
    }

    #[test]
    fn test_session_replaced_wholesale() -> Result<()> {
        let store = SqliteStore::open_in_memory()?;
        let expires_at = DateTime::parse_from_rfc3339("2026-10-16T12:00:00Z")?.with_timezone(&Utc);
        store.save_session("u1", &SealedSession { sealed: "a".into(), expires_at })?;
        store.save_session(
            "u1",
            &SealedSession {
                sealed: "b".into(),
                expires_at: expires_at + Duration::hours(1),
            },
        )?;

        let loaded = store.load_session("u1")?.unwrap();
        assert_eq!(loaded.sealed, "b");
        assert_eq!(loaded.expires_at, expires_at + Duration::hours(1));
        Ok(())
    }

    #[test]
    fn test_invalidate_and_relink_drop_session() -> Result<()> {
        let store = SqliteStore::open_in_memory()?;
        let session = SealedSession {
            sealed: "s".into(),
            expires_at: Utc::now(),
        };
        store.link_credential("u1", "e", "p")?;
        store.save_session("u1", &session)?;
        store.invalidate_credential("u1")?;
        assert!(store.load_session("u1")?.is_none());

        store.save_session("u1", &session)?;
        store.link_credential("u1", "e", "p")?;
        assert!(store.load_session("u1")?.is_none());
        Ok(())
    }

    #[test]
    fn test_clear_session_is_idempotent() -> Result<()> {
        let store = SqliteStore::open_in_memory()?;
        store.link_credential("u1", "e", "p")?;
        store.save_session(
            "u1",
            &SealedSession {
                sealed: "s".into(),
                expires_at: Utc::now(),
            },
        )?;

        store.clear_session("u1")?;
        store.clear_session("u1")?;
        assert!(store.load_session("u1")?.is_none());
        assert!(store.credential("u1")?.unwrap().auth_valid);
        Ok(())
    }
}
