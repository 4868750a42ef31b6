//! Freshness refresh of seat counts against the public schedule
//!
//! One fetch per distinct (studio, date) pair, in parallel but bounded. A
//! failed fetch only costs that pair its fresh data; its entries fall back to
//! the stored counts.

use seatwatch_core::{CatalogApi, Lesson, LessonKey, LessonStore, ObservedLesson, StoreDay};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Fresh observations of one cycle.
#[derive(Debug, Default, Clone)]
pub struct Freshness {
    observed: HashMap<StoreDay, HashMap<LessonKey, u32>>,
    failed: Vec<StoreDay>,
}

impl Freshness {
    /// Pairs fetched successfully.
    pub fn fetched(&self) -> usize {
        self.observed.len()
    }

    pub fn failed(&self) -> &[StoreDay] {
        &self.failed
    }

    /// Fresh seat count for `lesson`, if its pair was refreshed and the
    /// schedule lists a lesson with the same key. `None` means "use the
    /// stored value".
    pub fn available_slots(&self, lesson: &Lesson) -> Option<u32> {
        let day = StoreDay {
            store: lesson.store.clone(),
            date: lesson.date,
        };
        self.observed.get(&day)?.get(&lesson.key()).copied()
    }

    pub fn record(&mut self, day: StoreDay, lessons: Vec<ObservedLesson>) {
        let counts = lessons
            .into_iter()
            .map(|l| (l.key(), l.available_slots))
            .collect();
        self.observed.insert(day, counts);
    }

    /// Write every observation to the lesson store. Unmatched keys and failed
    /// writes are skipped. Returns the number of rows patched.
    pub fn patch(&self, lessons: &dyn LessonStore) -> usize {
        let mut patched = 0;
        for (key, slots) in self.observed.values().flatten() {
            match lessons.patch_availability(key, *slots) {
                Ok(rows) => patched += rows,
                Err(e) => warn!(
                    store = %key.store,
                    date = %key.date,
                    start_time = %key.start_time,
                    "Failed to patch lesson availability: {:#}", e
                ),
            }
        }
        patched
    }
}

pub struct Refresher {
    catalog: Arc<dyn CatalogApi>,
    limit: Arc<Semaphore>,
}

impl Refresher {
    pub fn new(catalog: Arc<dyn CatalogApi>, max_concurrent: usize) -> Self {
        Self {
            catalog,
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub async fn refresh(&self, days: BTreeSet<StoreDay>) -> Freshness {
        let mut tasks = JoinSet::new();
        for day in days {
            let catalog = self.catalog.clone();
            let limit = self.limit.clone();
            tasks.spawn(async move {
                let _permit = limit.acquire_owned().await.ok();
                let result = catalog.lessons(&day).await;
                (day, result)
            });
        }

        let mut freshness = Freshness::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((day, Ok(lessons))) => {
                    debug!(store = %day.store, date = %day.date, "Fetched {} lessons", lessons.len());
                    freshness.record(day, lessons);
                }
                Ok((day, Err(e))) => {
                    warn!(store = %day.store, date = %day.date, "Schedule refresh failed: {}", e);
                    freshness.failed.push(day);
                }
                Err(e) => warn!("Schedule refresh task aborted: {}", e),
            }
        }

        info!(
            "Refreshed {} store days ({} failed)",
            freshness.fetched(),
            freshness.failed.len()
        );
        freshness
    }
}
