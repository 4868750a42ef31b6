//! Auto-reservation state machine
//!
//! ```text
//! Start/LoggingIn --(SessionManager::login)--> SeatSelection --(seat_map)-->
//!   Reserving --(reserve)--> [Confirming --(confirm_reservation)-->] Done
//! ```
//!
//! Each transition is a plain function over the upstream result that either
//! hands the next state its input ([`Step::Continue`]) or settles the attempt
//! ([`Step::Done`]). [`AutoReserver`] runs the calls in order and sends the
//! settled message, at most one per attempt.

use seatwatch_channels::{messages, Notifier};
use seatwatch_core::{
    BookingApi, Lesson, ModalType, PendingWatch, ReservationAttempt, ResultCode, SeatMap, SeatNo,
    SessionError, SessionManager, UpstreamError,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::outcome::ReserveOutcome;

/// How an attempt ended, and what to tell the member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: ReserveOutcome,
    pub message: Option<String>,
}

impl Resolution {
    fn new(outcome: ReserveOutcome, message: String) -> Self {
        Self {
            outcome,
            message: Some(message),
        }
    }

    fn silent(outcome: ReserveOutcome) -> Self {
        Self {
            outcome,
            message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Continue(T),
    Done(Resolution),
}

/// Input of the confirm leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tmp_lesson_id: String,
    pub ticket_type: Option<String>,
    /// Shown to the member on success.
    pub note: String,
}

/// Start and LoggingIn: map a failed login to its terminal outcome.
pub fn login_failed(lesson: &Lesson, error: SessionError) -> Resolution {
    match error {
        SessionError::NotLinked => {
            Resolution::new(ReserveOutcome::AuthFailed, messages::setup_missing(lesson))
        }
        SessionError::BreakerOpen => {
            Resolution::new(ReserveOutcome::AuthInvalid, messages::breaker_open(lesson))
        }
        SessionError::Corrupted(_) => Resolution::new(
            ReserveOutcome::AuthFailed,
            messages::credential_corrupted(lesson),
        ),
        SessionError::Upstream(UpstreamError::Auth(_)) => {
            Resolution::new(ReserveOutcome::AuthFailed, messages::breaker_tripped(lesson))
        }
        SessionError::Upstream(e) => Resolution::new(
            ReserveOutcome::Error,
            messages::reservation_failed(lesson, &format!("could not log in ({e})")),
        ),
        SessionError::Store(e) => {
            warn!("Credential lookup failed: {:#}", e);
            Resolution::new(
                ReserveOutcome::Error,
                messages::reservation_failed(lesson, "an internal error occurred"),
            )
        }
    }
}

fn upstream_failed(lesson: &Lesson, error: UpstreamError) -> Resolution {
    match error {
        UpstreamError::SessionExpired => {
            Resolution::new(ReserveOutcome::AuthFailed, messages::session_expired(lesson))
        }
        other => Resolution::new(
            ReserveOutcome::Error,
            messages::reservation_failed(lesson, &other.to_string()),
        ),
    }
}

fn rejected(lesson: &Lesson, attempt: &ReservationAttempt) -> Resolution {
    let detail = if attempt.message.trim().is_empty() {
        format!("code {}", attempt.result_code)
    } else {
        format!("{} (code {})", attempt.message.trim(), attempt.result_code)
    };
    Resolution::new(
        ReserveOutcome::Error,
        messages::reservation_failed(lesson, &detail),
    )
}

/// SeatSelection. Selection is read-only; an empty map means the seat went
/// between refresh and now.
pub fn evaluate_seat_map(
    lesson: &Lesson,
    seat_map: Result<SeatMap, UpstreamError>,
    preferred: Option<&[SeatNo]>,
) -> Step<SeatNo> {
    let seat_map = match seat_map {
        Ok(map) => map,
        Err(e) => return Step::Done(upstream_failed(lesson, e)),
    };
    match seat_map.select(preferred) {
        Some(seat) => Step::Continue(seat),
        None => {
            debug!("No free seat on the map");
            Step::Done(Resolution::silent(ReserveOutcome::Conflict))
        }
    }
}

fn manual_reason(modal: Option<ModalType>) -> String {
    match modal {
        Some(ModalType::ReservationSwap) => {
            "you already hold a booking in a clashing slot and the site offers to swap it".to_string()
        }
        Some(ModalType::EventTicketPurchase) => {
            "this event lesson requires buying a dedicated ticket".to_string()
        }
        Some(ModalType::Unknown(code)) => {
            format!("the site asked for a confirmation it did not explain (type {code})")
        }
        Some(ModalType::OtherStoreTicket) | Some(ModalType::TicketConsumption) => {
            "the site asked for a confirmation without a reservation to confirm".to_string()
        }
        None => "the site asked for a confirmation without saying which".to_string(),
    }
}

/// Reserving: branch on the first leg's result code.
pub fn attempt_reserve(
    lesson: &Lesson,
    seat: SeatNo,
    attempt: Result<ReservationAttempt, UpstreamError>,
) -> Step<Confirmation> {
    let attempt = match attempt {
        Ok(attempt) => attempt,
        Err(e) => return Step::Done(upstream_failed(lesson, e)),
    };

    match attempt.result_code {
        ResultCode::Success => Step::Done(Resolution::new(
            ReserveOutcome::Success,
            messages::reserved(lesson, seat, None),
        )),
        ResultCode::SeatTaken => Step::Done(Resolution::silent(ReserveOutcome::Conflict)),
        ResultCode::NeedsConfirmation => {
            let modal = attempt.modal_type;
            let tmp_lesson_id = attempt.tmp_lesson_id.clone();
            let continuation = match (modal, tmp_lesson_id) {
                (Some(modal), Some(tmp_lesson_id)) if modal.is_auto_completable() => {
                    confirmation(modal, tmp_lesson_id, &attempt)
                }
                _ => None,
            };
            match continuation {
                Some(confirmation) => Step::Continue(confirmation),
                None => {
                    let reason = if modal == Some(ModalType::TicketConsumption)
                        && attempt.tmp_lesson_id.is_some()
                    {
                        "no ticket type was offered for this booking".to_string()
                    } else {
                        manual_reason(modal)
                    };
                    Step::Done(Resolution::new(
                        ReserveOutcome::NeedsConfirm,
                        messages::needs_manual(lesson, seat, &reason),
                    ))
                }
            }
        }
        ResultCode::Other(_) => Step::Done(rejected(lesson, &attempt)),
    }
}

fn confirmation(
    modal: ModalType,
    tmp_lesson_id: String,
    attempt: &ReservationAttempt,
) -> Option<Confirmation> {
    match modal {
        ModalType::TicketConsumption => {
            let ticket = attempt.ticket_types.first()?;
            let label = if ticket.name.is_empty() {
                &ticket.code
            } else {
                &ticket.name
            };
            Some(Confirmation {
                tmp_lesson_id,
                ticket_type: Some(ticket.code.clone()),
                note: format!("Used ticket: {label}"),
            })
        }
        ModalType::OtherStoreTicket => Some(Confirmation {
            tmp_lesson_id,
            ticket_type: None,
            note: "Booked with a cross-store ticket.".to_string(),
        }),
        _ => None,
    }
}

/// Confirming: only a zero code holds the seat.
pub fn attempt_confirm(
    lesson: &Lesson,
    seat: SeatNo,
    confirmation: &Confirmation,
    attempt: Result<ReservationAttempt, UpstreamError>,
) -> Resolution {
    match attempt {
        Ok(attempt) if attempt.result_code == ResultCode::Success => Resolution::new(
            ReserveOutcome::Success,
            messages::reserved(lesson, seat, Some(&confirmation.note)),
        ),
        Ok(attempt) => rejected(lesson, &attempt),
        Err(e) => upstream_failed(lesson, e),
    }
}

/// Drives one auto-reserve entry from login to a settled outcome.
pub struct AutoReserver {
    sessions: Arc<SessionManager>,
    booking: Arc<dyn BookingApi>,
    notifier: Notifier,
}

impl AutoReserver {
    pub fn new(sessions: Arc<SessionManager>, booking: Arc<dyn BookingApi>, notifier: Notifier) -> Self {
        Self {
            sessions,
            booking,
            notifier,
        }
    }

    /// Run the attempt and deliver its message. Delivery failure does not
    /// change the outcome.
    pub async fn run(&self, pending: &PendingWatch) -> ReserveOutcome {
        let resolution = self.resolve(pending).await;
        info!(
            entry_id = pending.entry.id,
            user_id = %pending.entry.user_id,
            outcome = %resolution.outcome,
            "Auto-reserve settled"
        );
        if let Some(message) = &resolution.message {
            let sent = self
                .notifier
                .notify(pending.notify_address.as_deref(), message)
                .await;
            debug!(entry_id = pending.entry.id, "Outcome message: {}", sent);
        }
        resolution.outcome
    }

    pub async fn resolve(&self, pending: &PendingWatch) -> Resolution {
        let lesson = &pending.lesson;

        // Re-reads auth_valid right before the login call.
        let session = match self.sessions.login(&pending.entry.user_id).await {
            Ok(session) => session,
            Err(e) => {
                debug!("Login step failed: {}", e);
                return login_failed(lesson, e);
            }
        };

        let seat_map = self.booking.seat_map(&session, &lesson.sid_hash).await;
        let seat = match evaluate_seat_map(lesson, seat_map, pending.entry.preferred_seats.as_deref()) {
            Step::Continue(seat) => seat,
            Step::Done(resolution) => return resolution,
        };
        debug!(seat, "Selected seat");

        let attempt = self.booking.reserve(&session, &lesson.sid_hash, seat).await;
        let confirmation = match attempt_reserve(lesson, seat, attempt) {
            Step::Continue(confirmation) => confirmation,
            Step::Done(resolution) => return resolution,
        };

        debug!(tmp_lesson_id = %confirmation.tmp_lesson_id, "Completing reservation");
        let attempt = self
            .booking
            .confirm_reservation(
                &session,
                &confirmation.tmp_lesson_id,
                confirmation.ticket_type.as_deref(),
            )
            .await;
        attempt_confirm(lesson, seat, &confirmation, attempt)
    }
}
