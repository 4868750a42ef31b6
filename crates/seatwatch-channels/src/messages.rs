//! User-facing message templates
//!
//! Every message names the class and tells the member what to do next.

use seatwatch_core::{Lesson, SeatNo};

fn header(lesson: &Lesson) -> String {
    format!(
        "{}\n{} {}-{}\n{} / {}",
        lesson.program_name,
        lesson.date.format("%Y-%m-%d (%a)"),
        lesson.start_time,
        lesson.end_time,
        lesson.store,
        lesson.instructor
    )
}

pub fn seat_open(lesson: &Lesson) -> String {
    format!(
        "A seat just opened up!\n\n{}\n\nBook it in the app before someone else does.",
        header(lesson)
    )
}

/// `note` describes a ticket or cross-store rule applied by the second step.
pub fn reserved(lesson: &Lesson, seat: SeatNo, note: Option<&str>) -> String {
    let mut text = format!(
        "Reserved automatically: seat {}.\n\n{}",
        seat,
        header(lesson)
    );
    if let Some(note) = note {
        text.push_str("\n\n");
        text.push_str(note);
    }
    text.push_str("\n\nCheck your reservations in the app; cancel there if you no longer need it.");
    text
}

pub fn needs_manual(lesson: &Lesson, seat: SeatNo, reason: &str) -> String {
    format!(
        "A seat (no. {}) is free, but the booking could not be completed automatically: {}.\n\n{}\n\nOpen the app and confirm the reservation manually.",
        seat,
        reason,
        header(lesson)
    )
}

/// `detail` is the upstream message and code, or the transport failure.
pub fn reservation_failed(lesson: &Lesson, detail: &str) -> String {
    format!(
        "Automatic reservation failed: {}.\n\n{}\n\nCheck the app and book manually if a seat is still free.",
        detail.trim(),
        header(lesson)
    )
}

pub fn session_expired(lesson: &Lesson) -> String {
    format!(
        "Automatic reservation stopped: the booking site ended the login session.\n\n{}\n\nCheck the app and book manually; if this keeps happening, re-link your account.",
        header(lesson)
    )
}

pub fn setup_missing(lesson: &Lesson) -> String {
    format!(
        "Automatic reservation is on, but no booking account is linked.\n\n{}\n\nLink your account in settings, then turn auto-reserve on again.",
        header(lesson)
    )
}

pub fn credential_corrupted(lesson: &Lesson) -> String {
    format!(
        "Automatic reservation failed: your saved login could not be read.\n\n{}\n\nRe-link your account in settings.",
        header(lesson)
    )
}

pub fn breaker_tripped(lesson: &Lesson) -> String {
    format!(
        "Login to the booking site failed, so automatic reservation is paused for your account to avoid a lockout.\n\n{}\n\nCheck your email and password, then re-link your account.",
        header(lesson)
    )
}

pub fn breaker_open(lesson: &Lesson) -> String {
    format!(
        "Automatic reservation skipped: your linked account failed to log in earlier.\n\n{}\n\nRe-link your account to resume automatic reservations.",
        header(lesson)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn lesson() -> Lesson {
        Lesson {
            id: 1,
            date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            start_time: "19:00".to_string(),
            end_time: "19:45".to_string(),
            program_name: "BB2 Hits".to_string(),
            instructor: "Aki".to_string(),
            store: "Ginza".to_string(),
            sid_hash: "sid".to_string(),
            available_slots: 1,
            is_full: false,
        }
    }

    #[test]
    fn test_every_message_names_the_class() {
        let lesson = lesson();
        for text in [
            seat_open(&lesson),
            reserved(&lesson, 3, None),
            needs_manual(&lesson, 3, "swap"),
            reservation_failed(&lesson, "code 500"),
            session_expired(&lesson),
            setup_missing(&lesson),
            credential_corrupted(&lesson),
            breaker_tripped(&lesson),
            breaker_open(&lesson),
        ] {
            assert!(text.contains("BB2 Hits"), "{text}");
            assert!(text.contains("19:00"), "{text}");
            assert!(text.contains("Ginza"), "{text}");
            assert!(text.contains("2026-10-16"), "{text}");
        }
    }

    #[test]
    fn test_reserved_mentions_seat_and_note() {
        let text = reserved(&lesson(), 12, Some("Used ticket: Regular"));
        assert!(text.contains("seat 12"));
        assert!(text.contains("Used ticket: Regular"));
    }

    #[test]
    fn test_failure_detail() {
        assert!(reservation_failed(&lesson(), " Full (code 999) ").contains("failed: Full (code 999)."));
    }

    #[test]
    fn test_auth_messages_name_relink() {
        assert!(breaker_tripped(&lesson()).contains("re-link"));
        assert!(breaker_open(&lesson()).contains("Re-link"));
        assert!(credential_corrupted(&lesson()).contains("Re-link"));
    }
}
