//! Terminal flag and garbage collection of watch entries

use chrono::NaiveDate;
use seatwatch_core::WatchStore;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::outcome::Disposition;

#[derive(Clone)]
pub struct Lifecycle {
    watches: Arc<dyn WatchStore>,
}

impl Lifecycle {
    pub fn new(watches: Arc<dyn WatchStore>) -> Self {
        Self { watches }
    }

    /// Set `notified = true`. Safe to repeat.
    pub fn mark_notified(&self, entry_id: i64) -> anyhow::Result<()> {
        self.watches.mark_notified(entry_id)
    }

    /// Persist a disposition. Returns whether the entry is now notified; a
    /// failed write leaves it pending for the next cycle.
    pub fn settle(&self, entry_id: i64, disposition: Disposition) -> bool {
        match disposition {
            Disposition::Retry => {
                debug!(entry_id, "Entry stays pending");
                false
            }
            Disposition::Done => match self.mark_notified(entry_id) {
                Ok(()) => true,
                Err(e) => {
                    warn!(entry_id, "Failed to mark entry notified: {:#}", e);
                    false
                }
            },
        }
    }

    /// Delete entries whose lesson date is before `today`, notified or not.
    pub fn cleanup(&self, today: NaiveDate) -> usize {
        match self.watches.delete_watches_before(today) {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Watch cleanup failed: {:#}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatwatch_core::{Lesson, LessonStore, NewWatch, WatchStore};
    use seatwatch_store::SqliteStore;

    fn lifecycle_with_entry(date: NaiveDate) -> (Arc<SqliteStore>, Lifecycle, i64) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let lesson_id = store
            .upsert_lesson(&Lesson {
                id: 0,
                date,
                start_time: "07:00".to_string(),
                end_time: "07:45".to_string(),
                program_name: "BSL House".to_string(),
                instructor: "Mei".to_string(),
                store: "Shibuya".to_string(),
                sid_hash: "sid".to_string(),
                available_slots: 0,
                is_full: true,
            })
            .unwrap();
        let id = store
            .upsert_watch(&NewWatch {
                user_id: "u1".to_string(),
                lesson_id,
                auto_reserve: false,
                preferred_seats: None,
            })
            .unwrap();
        (store.clone(), Lifecycle::new(store), id)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn test_mark_notified_twice() {
        let (store, lifecycle, id) = lifecycle_with_entry(today());
        lifecycle.mark_notified(id).unwrap();
        lifecycle.mark_notified(id).unwrap();
        assert!(store.watch(id).unwrap().unwrap().notified);
    }

    #[test]
    fn test_settle_retry_leaves_entry_pending() {
        let (store, lifecycle, id) = lifecycle_with_entry(today());
        assert!(!lifecycle.settle(id, Disposition::Retry));
        assert!(!store.watch(id).unwrap().unwrap().notified);
        assert!(lifecycle.settle(id, Disposition::Done));
        assert!(store.watch(id).unwrap().unwrap().notified);
    }

    #[test]
    fn test_cleanup_removes_yesterday() {
        let yesterday = today().pred_opt().unwrap();
        let (store, lifecycle, id) = lifecycle_with_entry(yesterday);
        assert_eq!(lifecycle.cleanup(today()), 1);
        assert!(store.watch(id).unwrap().is_none());
        assert_eq!(lifecycle.cleanup(today()), 0);
    }
}
