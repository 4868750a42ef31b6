use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};
use seatwatch_core::{Lesson, LessonKey, LessonStore};
use tracing::debug;

use crate::{SqliteStore, format_date, now_rfc3339, parse_date};

pub(crate) const LESSON_COLUMNS: &str = "l.id, l.date, l.start_time, l.end_time, l.program_name, \
     l.instructor, l.store, l.sid_hash, l.available_slots, l.is_full";

/// Read a lesson from [`LESSON_COLUMNS`] starting at column `offset`.
pub(crate) fn lesson_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Lesson> {
    let date: String = row.get(offset + 1)?;
    Ok(Lesson {
        id: row.get(offset)?,
        date: parse_date(offset + 1, &date)?,
        start_time: row.get(offset + 2)?,
        end_time: row.get(offset + 3)?,
        program_name: row.get(offset + 4)?,
        instructor: row.get(offset + 5)?,
        store: row.get(offset + 6)?,
        sid_hash: row.get(offset + 7)?,
        available_slots: row.get(offset + 8)?,
        is_full: row.get(offset + 9)?,
    })
}

impl SqliteStore {
    pub fn lesson(&self, id: i64) -> Result<Option<Lesson>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {LESSON_COLUMNS} FROM lessons l WHERE l.id = ?1"),
            params![id],
            |row| lesson_from_row(row, 0),
        )
        .optional()
        .context("Failed to load lesson")
    }
}

impl LessonStore for SqliteStore {
    fn upsert_lesson(&self, lesson: &Lesson) -> Result<i64> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "INSERT INTO lessons (date, start_time, end_time, program_name, instructor,
                                      store, sid_hash, available_slots, is_full, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(date, start_time, store, instructor) DO UPDATE SET
                     end_time = excluded.end_time,
                     program_name = excluded.program_name,
                     sid_hash = excluded.sid_hash,
                     available_slots = excluded.available_slots,
                     is_full = excluded.is_full,
                     updated_at = excluded.updated_at
                 RETURNING id",
                params![
                    format_date(lesson.date),
                    lesson.start_time,
                    lesson.end_time,
                    lesson.program_name,
                    lesson.instructor,
                    lesson.store,
                    lesson.sid_hash,
                    lesson.available_slots,
                    lesson.available_slots == 0,
                    now_rfc3339(),
                ],
                |row| row.get(0),
            )
            .context("Failed to upsert lesson")?;
        Ok(id)
    }

    fn patch_availability(&self, key: &LessonKey, available_slots: u32) -> Result<usize> {
        let conn = self.conn()?;
        let touched = conn
            .execute(
                "UPDATE lessons SET available_slots = ?1, is_full = ?2, updated_at = ?3
                 WHERE date = ?4 AND start_time = ?5 AND store = ?6 AND instructor = ?7",
                params![
                    available_slots,
                    available_slots == 0,
                    now_rfc3339(),
                    format_date(key.date),
                    key.start_time,
                    key.store,
                    key.instructor,
                ],
            )
            .context("Failed to patch lesson availability")?;
        if touched == 0 {
            debug!(
                store = %key.store,
                date = %key.date,
                start_time = %key.start_time,
                "No stored lesson matches the observed one"
            );
        }
        Ok(touched)
    }
}
