//! Classification of what happened to one watch entry in one cycle

use serde::Serialize;
use std::fmt;

/// Terminal classification of one auto-reserve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveOutcome {
    Success,
    /// A seat is free but the provider wants a decision only the member can make.
    NeedsConfirm,
    /// Someone else won the race for the seat. Retried next cycle.
    Conflict,
    Error,
    AuthFailed,
    /// The breaker was already open; nothing was sent upstream.
    AuthInvalid,
}

impl ReserveOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NeedsConfirm => "needs_confirm",
            Self::Conflict => "conflict",
            Self::Error => "error",
            Self::AuthFailed => "auth_failed",
            Self::AuthInvalid => "auth_invalid",
        }
    }

    pub fn disposition(self) -> Disposition {
        match self {
            Self::Conflict => Disposition::Retry,
            _ => Disposition::Done,
        }
    }
}

impl fmt::Display for ReserveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an entry is finished (`notified = true`) or stays pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Done,
    Retry,
}

/// What the cycle did with one entry that had a free seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryAction {
    /// Manual entry, member told about the free seat.
    SeatOpenSent,
    /// Manual entry, message could not be delivered; retried next cycle.
    SeatOpenDeferred,
    Reserved(ReserveOutcome),
}

impl EntryAction {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::SeatOpenSent => Disposition::Done,
            Self::SeatOpenDeferred => Disposition::Retry,
            Self::Reserved(outcome) => outcome.disposition(),
        }
    }
}
