//! JSON bodies exchanged with the booking provider

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::protocol::{ModalType, ReservationAttempt, ResultCode, TicketType};
use crate::types::{Lesson, LessonKey, Seat, SeatMap, SeatNo, SeatStatus};

/// Envelope fields every upstream JSON body carries.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Envelope {
    pub result_code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReserveRequest<'a> {
    pub sid_hash: &'a str,
    pub sheet_no: SeatNo,
}

#[derive(Debug, Serialize)]
pub(crate) struct ConfirmRequest<'a> {
    pub tmp_lesson_id: &'a str,
    pub ticket_type: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SeatMapBody {
    #[serde(default)]
    pub seats: Vec<WireSeat>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireSeat {
    pub no: SeatNo,
    /// 1 free, 2 taken by someone else, 3 taken by this member.
    pub status: i64,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

impl From<SeatMapBody> for SeatMap {
    fn from(body: SeatMapBody) -> Self {
        let seats: BTreeMap<SeatNo, Seat> = body
            .seats
            .into_iter()
            .map(|seat| {
                let status = match seat.status {
                    1 => SeatStatus::Available,
                    3 => SeatStatus::ReservedBySelf,
                    _ => SeatStatus::ReservedByOther,
                };
                (
                    seat.no,
                    Seat {
                        status,
                        x: seat.x,
                        y: seat.y,
                    },
                )
            })
            .collect();
        SeatMap { seats }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReservationBody {
    pub result_code: i64,
    #[serde(default)]
    pub message: String,
    pub modal_type: Option<i64>,
    pub tmp_lesson_id: Option<String>,
    #[serde(default)]
    pub ticket_types: Vec<TicketType>,
}

impl ReservationBody {
    pub fn into_attempt(self, raw: serde_json::Value) -> ReservationAttempt {
        ReservationAttempt {
            result_code: ResultCode::from(self.result_code),
            message: self.message,
            modal_type: self.modal_type.map(ModalType::from),
            tmp_lesson_id: self.tmp_lesson_id.filter(|id| !id.is_empty()),
            ticket_types: self.ticket_types,
            raw,
        }
    }
}

/// A lesson as published by the unauthenticated schedule endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedLesson {
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub program_name: String,
    pub instructor: String,
    pub store: String,
    pub sid_hash: String,
    pub available_slots: u32,
}

impl ObservedLesson {
    pub fn key(&self) -> LessonKey {
        LessonKey {
            date: self.date,
            start_time: self.start_time.clone(),
            store: self.store.clone(),
            instructor: self.instructor.clone(),
        }
    }

    pub fn into_lesson(self) -> Lesson {
        Lesson {
            id: 0,
            is_full: self.available_slots == 0,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            program_name: self.program_name,
            instructor: self.instructor,
            store: self.store,
            sid_hash: self.sid_hash,
            available_slots: self.available_slots,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScheduleBody {
    #[serde(default)]
    pub lessons: Vec<ObservedLesson>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub date: NaiveDate,
    pub start_time: String,
    pub program_name: String,
    pub instructor: String,
    pub store: String,
    pub seat_no: Option<SeatNo>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryBody {
    #[serde(default)]
    pub history: Vec<HistoryItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub member_no: String,
    pub home_store: String,
    #[serde(default)]
    pub plan: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileBody {
    pub profile: Profile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub code: String,
    pub name: String,
    pub remaining: u32,
    pub expires_on: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TicketsBody {
    #[serde(default)]
    pub tickets: Vec<Ticket>,
}
