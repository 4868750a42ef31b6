//! Client for the booking provider's session-cookie web API
//!
//! The provider is a legacy web app rather than a REST API: business outcomes
//! arrive as a `resultCode` in an HTTP 200 body, and an invalid session shows
//! up as 401, 403 or a 302 to the login page. This module folds that into two
//! channels: [`UpstreamError`] for transport and authentication failures, and
//! typed values such as [`ReservationAttempt`] for business outcomes.

mod client;
pub mod tokens;
pub mod wire;

use async_trait::async_trait;

use crate::protocol::ReservationAttempt;
use crate::types::{SeatMap, SeatNo, StoreDay, UpstreamSession};

pub use client::UpstreamClient;
pub use wire::{HistoryItem, ObservedLesson, Profile, Ticket};

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The provider refused the credentials or the handshake.
    #[error("login rejected: {0}")]
    Auth(String),

    /// 401, 403 or a redirect to the login page.
    #[error("upstream session expired")]
    SessionExpired,

    /// A read-only endpoint answered with a non-zero result code.
    #[error("upstream rejected the request ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Network, TLS or timeout failure.
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("could not decode upstream response: {0}")]
    Decode(String),
}

/// Authenticated operations of one member account.
#[async_trait]
pub trait BookingApi: Send + Sync {
    /// Three-step handshake: anonymous bootstrap, credential post, CSRF mining
    /// from an authenticated page.
    async fn login(&self, email: &str, password: &str) -> Result<UpstreamSession, UpstreamError>;

    async fn seat_map(
        &self,
        session: &UpstreamSession,
        sid_hash: &str,
    ) -> Result<SeatMap, UpstreamError>;

    /// First leg of a reservation. Business rejections are returned in the
    /// attempt, never as an error.
    async fn reserve(
        &self,
        session: &UpstreamSession,
        sid_hash: &str,
        seat: SeatNo,
    ) -> Result<ReservationAttempt, UpstreamError>;

    /// Second leg, only after the first leg asked for it.
    async fn confirm_reservation(
        &self,
        session: &UpstreamSession,
        tmp_lesson_id: &str,
        ticket_type: Option<&str>,
    ) -> Result<ReservationAttempt, UpstreamError>;

    async fn lesson_history(
        &self,
        session: &UpstreamSession,
        page: u32,
    ) -> Result<Vec<HistoryItem>, UpstreamError>;

    async fn profile(&self, session: &UpstreamSession) -> Result<Profile, UpstreamError>;

    async fn tickets(&self, session: &UpstreamSession) -> Result<Vec<Ticket>, UpstreamError>;
}

/// Public schedule with live seat counts; no session needed.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn lessons(&self, day: &StoreDay) -> Result<Vec<ObservedLesson>, UpstreamError>;
}
