//! Numeric codes of the upstream reservation protocol
//!
//! The booking provider reports business outcomes in a `resultCode` field of
//! an HTTP 200 body, and describes follow-up dialogs with a `modalType`.
//! Neither is documented; the meanings below are what the provider has been
//! observed to do. Anything not listed is kept as an opaque `Other`/`Unknown`
//! value and never guessed at.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome code of a reserve or confirm call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ResultCode {
    /// 0: the seat is held.
    Success,
    /// 205: someone else took the seat between observation and attempt.
    SeatTaken,
    /// 303: the provider wants a second step (see [`ModalType`]).
    NeedsConfirmation,
    Other(i64),
}

impl From<i64> for ResultCode {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::Success,
            205 => Self::SeatTaken,
            303 => Self::NeedsConfirmation,
            other => Self::Other(other),
        }
    }
}

impl From<ResultCode> for i64 {
    fn from(code: ResultCode) -> Self {
        match code {
            ResultCode::Success => 0,
            ResultCode::SeatTaken => 205,
            ResultCode::NeedsConfirmation => 303,
            ResultCode::Other(other) => other,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", i64::from(*self))
    }
}

/// Follow-up dialog announced alongside `resultCode = 303`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ModalType {
    /// 1042: booking at a studio other than the member's home studio with a
    /// cross-store ticket.
    OtherStoreTicket,
    /// 1143: the booking consumes a ticket; the dialog offers ticket types.
    TicketConsumption,
    /// 1024: the member already holds a booking in a clashing slot and is
    /// offered a swap.
    ReservationSwap,
    /// 10242: an event lesson that requires buying a dedicated ticket.
    EventTicketPurchase,
    Unknown(i64),
}

impl ModalType {
    /// Whether the second leg can be completed without asking the member.
    pub fn is_auto_completable(self) -> bool {
        matches!(self, Self::OtherStoreTicket | Self::TicketConsumption)
    }
}

impl From<i64> for ModalType {
    fn from(code: i64) -> Self {
        match code {
            1042 => Self::OtherStoreTicket,
            1143 => Self::TicketConsumption,
            1024 => Self::ReservationSwap,
            10242 => Self::EventTicketPurchase,
            other => Self::Unknown(other),
        }
    }
}

impl From<ModalType> for i64 {
    fn from(modal: ModalType) -> Self {
        match modal {
            ModalType::OtherStoreTicket => 1042,
            ModalType::TicketConsumption => 1143,
            ModalType::ReservationSwap => 1024,
            ModalType::EventTicketPurchase => 10242,
            ModalType::Unknown(other) => other,
        }
    }
}

/// Ticket type offered by the ticket-consumption dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    pub code: String,
    #[serde(default)]
    pub name: String,
}

/// Result of one reserve or confirm exchange. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationAttempt {
    pub result_code: ResultCode,
    pub message: String,
    pub modal_type: Option<ModalType>,
    /// Continuation id for the confirm leg.
    pub tmp_lesson_id: Option<String>,
    pub ticket_types: Vec<TicketType>,
    pub raw: serde_json::Value,
}
