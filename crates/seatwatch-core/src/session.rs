//! Cached upstream sessions and breaker-aware login
//!
//! Sessions are stored sealed (encrypted JSON). [`SessionManager`] hands out a
//! cached session while it is valid and otherwise logs in again, but only
//! while the user's breaker is closed.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::crypto::{Cipher, CipherError};
use crate::store::{CredentialStore, SealedSession};
use crate::types::UpstreamSession;
use crate::upstream::{BookingApi, UpstreamError};

pub fn seal(session: &UpstreamSession, cipher: &dyn Cipher) -> Result<SealedSession, CipherError> {
    let json = serde_json::to_string(session).map_err(|e| CipherError::Encrypt(e.to_string()))?;
    Ok(SealedSession {
        sealed: cipher.encrypt(&json)?,
        expires_at: session.expires_at,
    })
}

pub fn open(sealed: &SealedSession, cipher: &dyn Cipher) -> Result<UpstreamSession, CipherError> {
    let json = cipher.decrypt(&sealed.sealed)?;
    serde_json::from_str(&json).map_err(|e| CipherError::Decrypt(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no upstream account is linked for this user")]
    NotLinked,
    #[error("the linked upstream account was rejected earlier; re-link it first")]
    BreakerOpen,
    #[error("stored credentials could not be decrypted: {0}")]
    Corrupted(#[from] CipherError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Hands out upstream sessions for a user.
pub struct SessionManager {
    credentials: Arc<dyn CredentialStore>,
    booking: Arc<dyn BookingApi>,
    cipher: Arc<dyn Cipher>,
}

impl SessionManager {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        booking: Arc<dyn BookingApi>,
        cipher: Arc<dyn Cipher>,
    ) -> Self {
        Self {
            credentials,
            booking,
            cipher,
        }
    }

    /// A cached session that is still valid at `now`, if any. Unreadable
    /// cache entries are treated as absent.
    pub fn cached(&self, user_id: &str, now: DateTime<Utc>) -> anyhow::Result<Option<UpstreamSession>> {
        let Some(sealed) = self.credentials.load_session(user_id)? else {
            return Ok(None);
        };
        let session = match open(&sealed, self.cipher.as_ref()) {
            Ok(session) => session,
            Err(e) => {
                warn!(user_id, "Discarding unreadable cached session: {}", e);
                return Ok(None);
            }
        };
        if session.is_expired(now) {
            debug!(user_id, "Cached upstream session expired");
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Cached session, or a fresh login when there is none.
    pub async fn session(&self, user_id: &str) -> Result<UpstreamSession, SessionError> {
        if let Some(session) = self.cached(user_id, Utc::now())? {
            return Ok(session);
        }
        self.login(user_id).await
    }

    /// Runs `call` with the user's session. A cached session can be revoked
    /// upstream before its expiry; when the call reports that, the cache is
    /// dropped and the call is repeated once on a fresh login.
    pub async fn with_session<T, F, Fut>(&self, user_id: &str, call: F) -> Result<T, SessionError>
    where
        F: Fn(UpstreamSession) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let session = self.session(user_id).await?;
        match call(session).await {
            Err(UpstreamError::SessionExpired) => {
                info!(user_id, "Upstream rejected the cached session, logging in again");
                self.forget(user_id);
                let session = self.login(user_id).await?;
                Ok(call(session).await?)
            }
            result => Ok(result?),
        }
    }

    /// Fresh login. Trips the breaker when the provider rejects the
    /// credentials; never attempts a login while the breaker is open.
    pub async fn login(&self, user_id: &str) -> Result<UpstreamSession, SessionError> {
        let credential = self
            .credentials
            .credential(user_id)?
            .ok_or(SessionError::NotLinked)?;
        if !credential.auth_valid {
            return Err(SessionError::BreakerOpen);
        }

        let email = self.cipher.decrypt(&credential.email_encrypted)?;
        let password = self.cipher.decrypt(&credential.password_encrypted)?;

        match self.booking.login(&email, &password).await {
            Ok(session) => {
                info!(user_id, "Logged in to upstream");
                self.remember(user_id, &session);
                Ok(session)
            }
            Err(UpstreamError::Auth(reason)) => {
                warn!(user_id, "Upstream login rejected, opening breaker: {}", reason);
                self.credentials.invalidate_credential(user_id)?;
                Err(SessionError::Upstream(UpstreamError::Auth(reason)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the cached session. Failure leaves a session that the next
    /// upstream call rejects again.
    pub fn forget(&self, user_id: &str) {
        if let Err(e) = self.credentials.clear_session(user_id) {
            warn!(user_id, "Failed to drop cached session: {}", e);
        }
    }

    /// Cache a session for later readers. Failure only costs a future login.
    pub fn remember(&self, user_id: &str, session: &UpstreamSession) {
        let result = seal(session, self.cipher.as_ref())
            .map_err(anyhow::Error::from)
            .and_then(|sealed| self.credentials.save_session(user_id, &sealed));
        if let Err(e) = result {
            warn!(user_id, "Failed to cache upstream session: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesGcmCipher;
    use crate::protocol::ReservationAttempt;
    use crate::types::{SeatMap, SeatNo, UpstreamCredential};
    use crate::upstream::{HistoryItem, Profile, Ticket};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryCredentials {
        credential: Mutex<Option<UpstreamCredential>>,
        session: Mutex<Option<SealedSession>>,
    }

    impl CredentialStore for MemoryCredentials {
        fn credential(&self, _user_id: &str) -> anyhow::Result<Option<UpstreamCredential>> {
            Ok(self.credential.lock().unwrap().clone())
        }

        fn link_credential(&self, user_id: &str, email: &str, password: &str) -> anyhow::Result<()> {
            *self.credential.lock().unwrap() = Some(UpstreamCredential {
                user_id: user_id.to_string(),
                email_encrypted: email.to_string(),
                password_encrypted: password.to_string(),
                auth_valid: true,
            });
            *self.session.lock().unwrap() = None;
            Ok(())
        }

        fn invalidate_credential(&self, _user_id: &str) -> anyhow::Result<()> {
            if let Some(credential) = self.credential.lock().unwrap().as_mut() {
                credential.auth_valid = false;
            }
            *self.session.lock().unwrap() = None;
            Ok(())
        }

        fn save_session(&self, _user_id: &str, session: &SealedSession) -> anyhow::Result<()> {
            *self.session.lock().unwrap() = Some(session.clone());
            Ok(())
        }

        fn load_session(&self, _user_id: &str) -> anyhow::Result<Option<SealedSession>> {
            Ok(self.session.lock().unwrap().clone())
        }

        fn clear_session(&self, _user_id: &str) -> anyhow::Result<()> {
            *self.session.lock().unwrap() = None;
            Ok(())
        }
    }

    /// Hands out sessions whose cookie is "fresh"; history only accepts those.
    struct FakeBooking {
        reject_login: bool,
        logins: AtomicUsize,
        history_calls: AtomicUsize,
    }

    impl FakeBooking {
        fn new(reject_login: bool) -> Self {
            Self {
                reject_login,
                logins: AtomicUsize::new(0),
                history_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BookingApi for FakeBooking {
        async fn login(&self, email: &str, password: &str) -> Result<UpstreamSession, UpstreamError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            assert_eq!((email, password), ("me@example.com", "pw"));
            if self.reject_login {
                return Err(UpstreamError::Auth("bad password".into()));
            }
            Ok(session_with("fresh", Utc::now() + Duration::minutes(30)))
        }

        async fn seat_map(&self, _: &UpstreamSession, _: &str) -> Result<SeatMap, UpstreamError> {
            Err(UpstreamError::Decode("unused".into()))
        }

        async fn reserve(
            &self,
            _: &UpstreamSession,
            _: &str,
            _: SeatNo,
        ) -> Result<ReservationAttempt, UpstreamError> {
            Err(UpstreamError::Decode("unused".into()))
        }

        async fn confirm_reservation(
            &self,
            _: &UpstreamSession,
            _: &str,
            _: Option<&str>,
        ) -> Result<ReservationAttempt, UpstreamError> {
            Err(UpstreamError::Decode("unused".into()))
        }

        async fn lesson_history(
            &self,
            session: &UpstreamSession,
            _page: u32,
        ) -> Result<Vec<HistoryItem>, UpstreamError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            if session.session_cookie == "fresh" {
                Ok(Vec::new())
            } else {
                Err(UpstreamError::SessionExpired)
            }
        }

        async fn profile(&self, _: &UpstreamSession) -> Result<Profile, UpstreamError> {
            Err(UpstreamError::Decode("unused".into()))
        }

        async fn tickets(&self, _: &UpstreamSession) -> Result<Vec<Ticket>, UpstreamError> {
            Err(UpstreamError::Decode("unused".into()))
        }
    }

    struct Fixture {
        credentials: Arc<MemoryCredentials>,
        booking: Arc<FakeBooking>,
        cipher: Arc<AesGcmCipher>,
        manager: SessionManager,
    }

    fn fixture(reject_login: bool) -> Fixture {
        let credentials = Arc::new(MemoryCredentials::default());
        let booking = Arc::new(FakeBooking::new(reject_login));
        let cipher = Arc::new(AesGcmCipher::from_passphrase("k").unwrap());
        credentials
            .link_credential(
                "u1",
                &cipher.encrypt("me@example.com").unwrap(),
                &cipher.encrypt("pw").unwrap(),
            )
            .unwrap();
        let manager = SessionManager::new(credentials.clone(), booking.clone(), cipher.clone());
        Fixture {
            credentials,
            booking,
            cipher,
            manager,
        }
    }

    impl Fixture {
        fn cache(&self, session: &UpstreamSession) {
            let sealed = seal(session, self.cipher.as_ref()).unwrap();
            self.credentials.save_session("u1", &sealed).unwrap();
        }

        fn logins(&self) -> usize {
            self.booking.logins.load(Ordering::SeqCst)
        }

        fn auth_valid(&self) -> bool {
            self.credentials.credential("u1").unwrap().unwrap().auth_valid
        }
    }

    fn session_with(cookie: &str, expires_at: DateTime<Utc>) -> UpstreamSession {
        UpstreamSession {
            session_cookie: cookie.to_string(),
            ..session(expires_at)
        }
    }

    fn session(expires_at: DateTime<Utc>) -> UpstreamSession {
        UpstreamSession {
            session_cookie: "s".to_string(),
            xsrf_cookie: "x".to_string(),
            csrf_token: "c".to_string(),
            expires_at,
        }
    }

    #[test]
    fn test_seal_then_open() {
        let cipher = AesGcmCipher::from_passphrase("k").unwrap();
        let original = session(Utc::now() + Duration::minutes(10));
        let sealed = seal(&original, &cipher).unwrap();
        assert!(!sealed.sealed.contains("\"s\""));
        assert_eq!(sealed.expires_at, original.expires_at);
        assert_eq!(open(&sealed, &cipher).unwrap(), original);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sealed = seal(
            &session(Utc::now()),
            &AesGcmCipher::from_passphrase("a").unwrap(),
        )
        .unwrap();
        assert!(open(&sealed, &AesGcmCipher::from_passphrase("b").unwrap()).is_err());
    }

    #[tokio::test]
    async fn test_login_result_is_cached() {
        let f = fixture(false);
        let first = f.manager.session("u1").await.unwrap();
        let second = f.manager.session("u1").await.unwrap();

        assert_eq!(first.session_cookie, "fresh");
        assert_eq!(second, first);
        assert_eq!(f.logins(), 1);
    }

    #[tokio::test]
    async fn test_rejected_login_opens_breaker() {
        let f = fixture(true);
        let err = f.manager.login("u1").await.unwrap_err();
        assert!(matches!(err, SessionError::Upstream(UpstreamError::Auth(_))));
        assert!(!f.auth_valid());

        let err = f.manager.session("u1").await.unwrap_err();
        assert!(matches!(err, SessionError::BreakerOpen));
        assert_eq!(f.logins(), 1);
    }

    #[tokio::test]
    async fn test_unlinked_user_is_reported() {
        let f = fixture(false);
        *f.credentials.credential.lock().unwrap() = None;
        let err = f.manager.session("u1").await.unwrap_err();
        assert!(matches!(err, SessionError::NotLinked));
        assert_eq!(f.logins(), 0);
    }

    #[tokio::test]
    async fn test_expired_cache_logs_in_again() {
        let f = fixture(false);
        f.cache(&session_with("old", Utc::now() - Duration::minutes(1)));
        assert!(f.manager.cached("u1", Utc::now()).unwrap().is_none());

        let session = f.manager.session("u1").await.unwrap();
        assert_eq!(session.session_cookie, "fresh");
        assert_eq!(f.logins(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_cache_logs_in_again() {
        let f = fixture(false);
        f.credentials
            .save_session(
                "u1",
                &SealedSession {
                    sealed: "not-a-ciphertext".into(),
                    expires_at: Utc::now() + Duration::hours(1),
                },
            )
            .unwrap();
        assert!(f.manager.cached("u1", Utc::now()).unwrap().is_none());

        let session = f.manager.session("u1").await.unwrap();
        assert_eq!(session.session_cookie, "fresh");
        assert_eq!(f.logins(), 1);
    }

    #[tokio::test]
    async fn test_revoked_cached_session_is_replaced_once() {
        let f = fixture(false);
        f.cache(&session_with("revoked", Utc::now() + Duration::hours(1)));

        let booking = f.booking.clone();
        let items = f
            .manager
            .with_session("u1", |session| {
                let booking = booking.clone();
                async move { booking.lesson_history(&session, 1).await }
            })
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(f.logins(), 1);
        assert_eq!(f.booking.history_calls.load(Ordering::SeqCst), 2);
        let cached = f.manager.cached("u1", Utc::now()).unwrap().unwrap();
        assert_eq!(cached.session_cookie, "fresh");
    }

    #[tokio::test]
    async fn test_revoked_session_does_not_bypass_breaker() {
        let f = fixture(false);
        f.cache(&session_with("revoked", Utc::now() + Duration::hours(1)));
        f.credentials.credential.lock().unwrap().as_mut().unwrap().auth_valid = false;

        let booking = f.booking.clone();
        let err = f
            .manager
            .with_session("u1", |session| {
                let booking = booking.clone();
                async move { booking.lesson_history(&session, 1).await }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::BreakerOpen));
        assert_eq!(f.logins(), 0);
        assert!(f.credentials.load_session("u1").unwrap().is_none());
    }
}
