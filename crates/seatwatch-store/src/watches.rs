use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};
use seatwatch_core::{NewWatch, PendingWatch, SeatNo, WatchEntry, WatchStore};
use tracing::{debug, info, warn};

use crate::lessons::{LESSON_COLUMNS, lesson_from_row};
use crate::{SqliteStore, format_date, now_rfc3339};

const WATCH_COLUMNS: &str =
    "w.id, w.user_id, w.lesson_id, w.notified, w.auto_reserve, w.preferred_seats";

fn watch_from_row(row: &Row<'_>) -> rusqlite::Result<WatchEntry> {
    let seats: Option<String> = row.get(5)?;
    let preferred_seats = seats
        .map(|raw| serde_json::from_str::<Vec<SeatNo>>(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(WatchEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        lesson_id: row.get(2)?,
        notified: row.get(3)?,
        auto_reserve: row.get(4)?,
        preferred_seats,
    })
}

fn pending_from_row(row: &Row<'_>) -> rusqlite::Result<PendingWatch> {
    Ok(PendingWatch {
        entry: watch_from_row(row)?,
        lesson: lesson_from_row(row, 6)?,
        notify_address: row.get(16)?,
    })
}

impl SqliteStore {
    pub fn watch(&self, id: i64) -> Result<Option<WatchEntry>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {WATCH_COLUMNS} FROM watch_entries w WHERE w.id = ?1"),
            params![id],
            watch_from_row,
        )
        .optional()
        .context("Failed to load watch entry")
    }
}

impl WatchStore for SqliteStore {
    fn pending_watches(&self) -> Result<Vec<PendingWatch>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {WATCH_COLUMNS}, {LESSON_COLUMNS}, u.notify_address
             FROM watch_entries w
             JOIN lessons l ON l.id = w.lesson_id
             LEFT JOIN users u ON u.id = w.user_id
             WHERE w.notified = 0
             ORDER BY w.id"
        );
        let mut stmt = conn.prepare(&sql).context("Failed to prepare pending query")?;
        // Each row decodes on its own so one malformed lesson or seat list
        // only drops that entry.
        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                Ok((id, pending_from_row(row)))
            })
            .context("Failed to query pending watches")?;

        let mut pending = Vec::new();
        for row in rows {
            let (id, decoded) = row.context("Failed to read pending watches")?;
            match decoded {
                Ok(watch) => pending.push(watch),
                Err(e) => warn!(entry_id = id, "Skipping unreadable watch entry: {}", e),
            }
        }
        debug!("Loaded {} pending watch entries", pending.len());
        Ok(pending)
    }

    fn upsert_watch(&self, watch: &NewWatch) -> Result<i64> {
        let seats = watch
            .preferred_seats
            .as_ref()
            .filter(|seats| !seats.is_empty())
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode preferred seats")?;

        let conn = self.conn()?;
        let id = conn
            .query_row(
                "INSERT INTO watch_entries (user_id, lesson_id, notified, auto_reserve,
                                            preferred_seats, created_at)
                 VALUES (?1, ?2, 0, ?3, ?4, ?5)
                 ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                     notified = 0,
                     auto_reserve = excluded.auto_reserve,
                     preferred_seats = excluded.preferred_seats
                 RETURNING id",
                params![
                    watch.user_id,
                    watch.lesson_id,
                    watch.auto_reserve,
                    seats,
                    now_rfc3339()
                ],
                |row| row.get(0),
            )
            .context("Failed to upsert watch entry")?;
        Ok(id)
    }

    fn mark_notified(&self, entry_id: i64) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE watch_entries SET notified = 1 WHERE id = ?1",
                params![entry_id],
            )
            .context("Failed to mark watch entry notified")?;
        Ok(())
    }

    fn delete_watch(&self, entry_id: i64) -> Result<bool> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM watch_entries WHERE id = ?1", params![entry_id])
            .context("Failed to delete watch entry")?;
        Ok(deleted > 0)
    }

    fn delete_watches_before(&self, today: NaiveDate) -> Result<usize> {
        let deleted = self
            .conn()?
            .execute(
                "DELETE FROM watch_entries
                 WHERE lesson_id IN (SELECT id FROM lessons WHERE date < ?1)",
                params![format_date(today)],
            )
            .context("Failed to delete past watch entries")?;
        if deleted > 0 {
            info!("Deleted {} watch entries for past lessons", deleted);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{lesson, store_with_lesson};
    use seatwatch_core::LessonStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn new_watch(lesson_id: i64, auto_reserve: bool, seats: Option<Vec<SeatNo>>) -> NewWatch {
        NewWatch {
            user_id: "u1".to_string(),
            lesson_id,
            auto_reserve,
            preferred_seats: seats,
        }
    }

    #[test]
    fn test_one_entry_per_user_and_lesson() -> Result<()> {
        let (store, lesson_id) = store_with_lesson(today());
        let first = store.upsert_watch(&new_watch(lesson_id, false, None))?;
        store.mark_notified(first)?;

        let second = store.upsert_watch(&new_watch(lesson_id, true, Some(vec![12, 3])))?;
        assert_eq!(first, second);

        let entry = store.watch(first)?.unwrap();
        assert!(!entry.notified, "re-watching re-arms the entry");
        assert!(entry.auto_reserve);
        assert_eq!(entry.preferred_seats, Some(vec![12, 3]));
        Ok(())
    }

    #[test]
    fn test_pending_joins_lesson_and_address() -> Result<()> {
        let (store, lesson_id) = store_with_lesson(today());
        store.set_notify_address("u1", Some("line-u1"))?;
        let id = store.upsert_watch(&new_watch(lesson_id, false, Some(vec![])))?;

        let pending = store.pending_watches()?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entry.id, id);
        assert_eq!(pending[0].entry.preferred_seats, None);
        assert_eq!(pending[0].lesson.id, lesson_id);
        assert_eq!(pending[0].lesson.start_time, "19:00");
        assert_eq!(pending[0].notify_address.as_deref(), Some("line-u1"));

        store.mark_notified(id)?;
        assert!(store.pending_watches()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_malformed_rows_are_skipped() -> Result<()> {
        let (store, lesson_id) = store_with_lesson(today());
        let good = store.upsert_watch(&new_watch(lesson_id, false, None))?;

        let tomorrow = today().succ_opt().unwrap();
        let bad_lesson = store.upsert_lesson(&lesson(tomorrow, "07:00", 1))?;
        store.upsert_watch(&NewWatch {
            user_id: "u2".to_string(),
            ..new_watch(bad_lesson, false, None)
        })?;
        let bad_seats = store.upsert_watch(&NewWatch {
            user_id: "u3".to_string(),
            ..new_watch(lesson_id, true, None)
        })?;
        {
            let conn = store.conn()?;
            conn.execute(
                "UPDATE lessons SET date = '2026/10/17' WHERE id = ?1",
                params![bad_lesson],
            )?;
            conn.execute(
                "UPDATE watch_entries SET preferred_seats = 'not json' WHERE id = ?1",
                params![bad_seats],
            )?;
        }

        let pending = store.pending_watches()?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entry.id, good);
        Ok(())
    }

    #[test]
    fn test_pending_without_user_row() -> Result<()> {
        let (store, lesson_id) = store_with_lesson(today());
        store.upsert_watch(&new_watch(lesson_id, false, None))?;
        let pending = store.pending_watches()?;
        assert_eq!(pending[0].notify_address, None);
        Ok(())
    }

    #[test]
    fn test_mark_notified_twice() -> Result<()> {
        let (store, lesson_id) = store_with_lesson(today());
        let id = store.upsert_watch(&new_watch(lesson_id, false, None))?;
        store.mark_notified(id)?;
        store.mark_notified(id)?;
        assert!(store.watch(id)?.unwrap().notified);

        // Unknown ids are not an error either.
        store.mark_notified(9_999)?;
        Ok(())
    }

    #[test]
    fn test_delete_before_today_ignores_notified_flag() -> Result<()> {
        let (store, today_lesson) = store_with_lesson(today());
        let yesterday = today().pred_opt().unwrap();
        let past_lesson = store.upsert_lesson(&lesson(yesterday, "07:00", 0))?;

        let past_pending = store.upsert_watch(&new_watch(past_lesson, false, None))?;
        let past_notified = store.upsert_watch(&NewWatch {
            user_id: "u2".to_string(),
            ..new_watch(past_lesson, true, None)
        })?;
        store.mark_notified(past_notified)?;
        let current = store.upsert_watch(&new_watch(today_lesson, false, None))?;

        assert_eq!(store.delete_watches_before(today())?, 2);
        assert!(store.watch(past_pending)?.is_none());
        assert!(store.watch(past_notified)?.is_none());
        assert!(store.watch(current)?.is_some());

        assert_eq!(store.delete_watches_before(today())?, 0);
        Ok(())
    }

    #[test]
    fn test_delete_watch() -> Result<()> {
        let (store, lesson_id) = store_with_lesson(today());
        let id = store.upsert_watch(&new_watch(lesson_id, false, None))?;
        assert!(store.delete_watch(id)?);
        assert!(!store.delete_watch(id)?);
        Ok(())
    }
}
