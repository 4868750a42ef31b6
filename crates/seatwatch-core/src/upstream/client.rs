//! reqwest implementation of [`BookingApi`] and [`CatalogApi`]

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::{RequestBuilder, Response, StatusCode, redirect};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::tokens::{TokenDelta, TokenJar, session_cookie_header};
use super::wire::{
    ConfirmRequest, Envelope, HistoryBody, LoginRequest, ProfileBody, ReservationBody,
    ReserveRequest, ScheduleBody, SeatMapBody, TicketsBody,
};
use super::{BookingApi, CatalogApi, HistoryItem, ObservedLesson, Profile, Ticket, UpstreamError};
use crate::config::UpstreamConfig;
use crate::protocol::ReservationAttempt;
use crate::types::{SeatMap, SeatNo, StoreDay, UpstreamSession};

const LOGIN_PAGE: &str = "/login";
const LOGIN_API: &str = "/api/login";
const MY_PAGE: &str = "/mypage";
const SEAT_MAP: &str = "/api/lesson/seat-map";
const RESERVE: &str = "/api/lesson/reserve";
const RESERVE_CONFIRM: &str = "/api/lesson/reserve/confirm";
const SCHEDULE: &str = "/api/lesson/schedule";
const HISTORY: &str = "/api/mypage/lesson-history";
const PROFILE: &str = "/api/mypage/profile";
const TICKETS: &str = "/api/mypage/tickets";

const CSRF_HEADER: &str = "X-CSRF-TOKEN";

/// HTTP client for one booking provider.
///
/// Holds no per-user state; sessions are passed into each call.
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: Url,
    session_ttl: chrono::Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid upstream base URL {}", config.base_url))?;

        // Redirects must stay visible: a 302 to the login page means the
        // session is gone.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(redirect::Policy::none())
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            http,
            base_url,
            session_ttl: chrono::Duration::minutes(config.session_ttl_minutes),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, UpstreamError> {
        self.base_url
            .join(path)
            .map_err(|e| UpstreamError::Decode(format!("bad endpoint {path}: {e}")))
    }

    fn with_session(builder: RequestBuilder, session: &UpstreamSession) -> RequestBuilder {
        builder
            .header(COOKIE, session_cookie_header(session))
            .header(CSRF_HEADER, &session.csrf_token)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ACCEPT, "application/json")
    }

    fn with_jar(builder: RequestBuilder, jar: &TokenJar) -> RequestBuilder {
        let builder = match jar.cookie_header() {
            Some(cookies) => builder.header(COOKIE, cookies),
            None => builder,
        };
        match jar.csrf_token() {
            Some(token) => builder.header(CSRF_HEADER, token),
            None => builder,
        }
    }

    /// Status check for one handshake step. 5xx stays a transport-level
    /// failure so that a flaky provider never trips the login breaker.
    async fn check_login_step(step: &str, response: Response) -> Result<Response, UpstreamError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Err(UpstreamError::Auth(format!("{step} returned HTTP {status}")))
    }

    async fn bootstrap(&self, jar: &mut TokenJar) -> Result<(), UpstreamError> {
        let response = self
            .http
            .get(self.endpoint(LOGIN_PAGE)?)
            .send()
            .await?;
        let response = Self::check_login_step("login page", response).await?;
        let delta = TokenDelta::from_headers(response.headers());
        let page = response.text().await?;
        jar.merge(delta.with_page(&page));
        debug!("Login step 1: anonymous tokens acquired");
        Ok(())
    }

    async fn post_credentials(
        &self,
        jar: &mut TokenJar,
        email: &str,
        password: &str,
    ) -> Result<(), UpstreamError> {
        let request = self
            .http
            .post(self.endpoint(LOGIN_API)?)
            .header(ACCEPT, "application/json")
            .json(&LoginRequest { email, password });
        let response = Self::with_jar(request, jar).send().await?;
        let response = Self::check_login_step("credential post", response).await?;
        let delta = TokenDelta::from_headers(response.headers());

        let text = response.text().await?;
        let envelope: Envelope =
            serde_json::from_str(&text).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        if envelope.result_code != 0 {
            return Err(UpstreamError::Auth(format!(
                "{} (code {})",
                envelope.message, envelope.result_code
            )));
        }

        jar.merge(delta);
        debug!("Login step 2: credentials accepted");
        Ok(())
    }

    async fn mine_page_token(&self, jar: &mut TokenJar) -> Result<(), UpstreamError> {
        let request = self.http.get(self.endpoint(MY_PAGE)?);
        let response = Self::with_jar(request, jar).send().await?;
        let response = Self::check_login_step("member page", response).await?;
        let delta = TokenDelta::from_headers(response.headers());
        let page = response.text().await?;
        let delta = delta.with_page(&page);
        if delta.csrf_token.is_none() {
            return Err(UpstreamError::Auth(
                "member page carried no CSRF token".to_string(),
            ));
        }
        jar.merge(delta);
        debug!("Login step 3: page token mined");
        Ok(())
    }

    /// Decode an authenticated JSON response, mapping the provider's three
    /// ways of saying "not logged in" to [`UpstreamError::SessionExpired`].
    async fn decode<T: DeserializeOwned>(
        response: Response,
    ) -> Result<(T, serde_json::Value), UpstreamError> {
        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FOUND | StatusCode::FORBIDDEN
        ) {
            return Err(UpstreamError::SessionExpired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let raw: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        let body = serde_json::from_value(raw.clone())
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok((body, raw))
    }

    /// Like [`Self::decode`], but a non-zero result code is an error. Used by
    /// endpoints that have no business outcomes of their own.
    async fn decode_ok<T: DeserializeOwned>(response: Response) -> Result<T, UpstreamError> {
        let (body, raw) = Self::decode::<T>(response).await?;
        let envelope: Envelope =
            serde_json::from_value(raw).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        if envelope.result_code != 0 {
            return Err(UpstreamError::Rejected {
                code: envelope.result_code,
                message: envelope.message,
            });
        }
        Ok(body)
    }

    async fn reservation(response: Response) -> Result<ReservationAttempt, UpstreamError> {
        let (body, raw) = Self::decode::<ReservationBody>(response).await?;
        Ok(body.into_attempt(raw))
    }
}

#[async_trait]
impl BookingApi for UpstreamClient {
    async fn login(&self, email: &str, password: &str) -> Result<UpstreamSession, UpstreamError> {
        let mut jar = TokenJar::default();
        self.bootstrap(&mut jar).await?;
        self.post_credentials(&mut jar, email, password).await?;
        self.mine_page_token(&mut jar).await?;
        jar.into_session(Utc::now(), self.session_ttl)
    }

    async fn seat_map(
        &self,
        session: &UpstreamSession,
        sid_hash: &str,
    ) -> Result<SeatMap, UpstreamError> {
        let request = self
            .http
            .get(self.endpoint(SEAT_MAP)?)
            .query(&[("sid", sid_hash)]);
        let response = Self::with_session(request, session).send().await?;
        let body: SeatMapBody = Self::decode_ok(response).await?;
        Ok(SeatMap::from(body))
    }

    async fn reserve(
        &self,
        session: &UpstreamSession,
        sid_hash: &str,
        seat: SeatNo,
    ) -> Result<ReservationAttempt, UpstreamError> {
        let request = self
            .http
            .post(self.endpoint(RESERVE)?)
            .json(&ReserveRequest {
                sid_hash,
                sheet_no: seat,
            });
        let response = Self::with_session(request, session).send().await?;
        Self::reservation(response).await
    }

    async fn confirm_reservation(
        &self,
        session: &UpstreamSession,
        tmp_lesson_id: &str,
        ticket_type: Option<&str>,
    ) -> Result<ReservationAttempt, UpstreamError> {
        let request = self
            .http
            .post(self.endpoint(RESERVE_CONFIRM)?)
            .json(&ConfirmRequest {
                tmp_lesson_id,
                ticket_type,
            });
        let response = Self::with_session(request, session).send().await?;
        Self::reservation(response).await
    }

    async fn lesson_history(
        &self,
        session: &UpstreamSession,
        page: u32,
    ) -> Result<Vec<HistoryItem>, UpstreamError> {
        let request = self
            .http
            .get(self.endpoint(HISTORY)?)
            .query(&[("page", page)]);
        let response = Self::with_session(request, session).send().await?;
        let body: HistoryBody = Self::decode_ok(response).await?;
        Ok(body.history)
    }

    async fn profile(&self, session: &UpstreamSession) -> Result<Profile, UpstreamError> {
        let request = self.http.get(self.endpoint(PROFILE)?);
        let response = Self::with_session(request, session).send().await?;
        let body: ProfileBody = Self::decode_ok(response).await?;
        Ok(body.profile)
    }

    async fn tickets(&self, session: &UpstreamSession) -> Result<Vec<Ticket>, UpstreamError> {
        let request = self.http.get(self.endpoint(TICKETS)?);
        let response = Self::with_session(request, session).send().await?;
        let body: TicketsBody = Self::decode_ok(response).await?;
        Ok(body.tickets)
    }
}

#[async_trait]
impl CatalogApi for UpstreamClient {
    async fn lessons(&self, day: &StoreDay) -> Result<Vec<ObservedLesson>, UpstreamError> {
        let date = day.date.format("%Y-%m-%d").to_string();
        let response = self
            .http
            .get(self.endpoint(SCHEDULE)?)
            .query(&[("store", day.store.as_str()), ("date", date.as_str())])
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let body: ScheduleBody = Self::decode_ok(response).await?;
        Ok(body.lessons)
    }
}
