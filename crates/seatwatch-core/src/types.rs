//! Domain types shared by every seatwatch crate

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Seat number as printed on the studio floor plan.
pub type SeatNo = u32;

/// One scheduled class at one studio.
///
/// Owned by the catalog ingestion pipeline; the watch cycle only reads it and
/// patches `available_slots`/`is_full`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub date: NaiveDate,
    /// `HH:MM`, as published by the studio.
    pub start_time: String,
    pub end_time: String,
    pub program_name: String,
    pub instructor: String,
    pub store: String,
    /// Studio-scoped opaque handle for the seat map.
    pub sid_hash: String,
    pub available_slots: u32,
    pub is_full: bool,
}

impl Lesson {
    pub fn key(&self) -> LessonKey {
        LessonKey {
            date: self.date,
            start_time: self.start_time.clone(),
            store: self.store.clone(),
            instructor: self.instructor.clone(),
        }
    }

    /// Short human label used in notifications and logs.
    pub fn label(&self) -> String {
        format!(
            "{} {} {}-{} @{} ({})",
            self.program_name,
            self.date.format("%Y-%m-%d"),
            self.start_time,
            self.end_time,
            self.store,
            self.instructor
        )
    }
}

/// Best-effort identity of a lesson across the catalog and upstream schedule.
///
/// There is no shared foreign key, so a fresh observation is matched to a
/// stored row by exact equality of these four fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LessonKey {
    pub date: NaiveDate,
    pub start_time: String,
    pub store: String,
    pub instructor: String,
}

/// A (studio, date) pair; the unit of one catalog refresh.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreDay {
    pub store: String,
    pub date: NaiveDate,
}

impl fmt::Display for StoreDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store, self.date)
    }
}

/// A user's standing request to hear about (or claim) a seat in one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub id: i64,
    pub user_id: String,
    pub lesson_id: i64,
    /// Terminal once true.
    pub notified: bool,
    pub auto_reserve: bool,
    /// Seats in the user's priority order.
    pub preferred_seats: Option<Vec<SeatNo>>,
}

/// Input for creating or re-arming a watch entry.
#[derive(Debug, Clone)]
pub struct NewWatch {
    pub user_id: String,
    pub lesson_id: i64,
    pub auto_reserve: bool,
    pub preferred_seats: Option<Vec<SeatNo>>,
}

/// A pending watch entry joined with its lesson and the owner's push address.
#[derive(Debug, Clone)]
pub struct PendingWatch {
    pub entry: WatchEntry,
    pub lesson: Lesson,
    pub notify_address: Option<String>,
}

/// Encrypted upstream login of one user plus the lockout breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamCredential {
    pub user_id: String,
    pub email_encrypted: String,
    pub password_encrypted: String,
    /// Once false, no login is attempted until the user re-links.
    pub auth_valid: bool,
}

/// The three opaque tokens that make up an authenticated upstream session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamSession {
    pub session_cookie: String,
    pub xsrf_cookie: String,
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
}

impl UpstreamSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for UpstreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamSession")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Available,
    ReservedByOther,
    ReservedBySelf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub status: SeatStatus,
    pub x: i32,
    pub y: i32,
}

/// Live view of one lesson's seats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeatMap {
    pub seats: BTreeMap<SeatNo, Seat>,
}

impl SeatMap {
    /// Free seats in ascending seat number order.
    pub fn available(&self) -> Vec<SeatNo> {
        self.seats
            .iter()
            .filter(|(_, seat)| seat.status == SeatStatus::Available)
            .map(|(no, _)| *no)
            .collect()
    }

    pub fn is_available(&self, seat: SeatNo) -> bool {
        self.seats
            .get(&seat)
            .is_some_and(|s| s.status == SeatStatus::Available)
    }

    /// Pick the seat to claim unattended.
    ///
    /// The first free seat in `preferred` order wins; otherwise (no
    /// preference, or none of the preferred seats is free) the smallest free
    /// seat number.
    pub fn select(&self, preferred: Option<&[SeatNo]>) -> Option<SeatNo> {
        if let Some(seat) = preferred
            .unwrap_or_default()
            .iter()
            .copied()
            .find(|seat| self.is_available(*seat))
        {
            return Some(seat);
        }
        self.available().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(free: &[SeatNo], taken: &[SeatNo]) -> SeatMap {
        let mut seats = BTreeMap::new();
        for (i, no) in free.iter().enumerate() {
            seats.insert(
                *no,
                Seat { status: SeatStatus::Available, x: i as i32, y: 0 },
            );
        }
        for no in taken {
            seats.insert(
                *no,
                Seat { status: SeatStatus::ReservedByOther, x: 0, y: 1 },
            );
        }
        SeatMap { seats }
    }

    #[test]
    fn test_select_smallest_without_preference() {
        let map = map_with(&[12, 3, 7], &[1, 2]);
        assert_eq!(map.select(None), Some(3));
    }

    #[test]
    fn test_select_follows_preference_order() {
        let map = map_with(&[3, 7, 12], &[]);
        assert_eq!(map.select(Some(&[12, 3])), Some(12));
    }

    #[test]
    fn test_select_skips_taken_preferences() {
        let map = map_with(&[3, 7], &[12]);
        assert_eq!(map.select(Some(&[12, 7])), Some(7));
        assert_eq!(map.select(Some(&[12])), Some(3));
    }

    #[test]
    fn test_select_empty_map() {
        let map = map_with(&[], &[1, 2, 3]);
        assert!(map.available().is_empty());
        assert_eq!(map.select(Some(&[1])), None);
    }

    #[test]
    fn test_session_debug_hides_tokens() {
        let session = UpstreamSession {
            session_cookie: "secret-session".to_string(),
            xsrf_cookie: "secret-xsrf".to_string(),
            csrf_token: "secret-csrf".to_string(),
            expires_at: Utc::now(),
        };
        let printed = format!("{:?}", session);
        assert!(!printed.contains("secret"));
    }
}
