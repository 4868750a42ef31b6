//! One watch cycle: refresh, evaluate, reserve or notify, settle, clean up

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use seatwatch_channels::{messages, Notifier};
use seatwatch_core::config::SchedulerConfig;
use seatwatch_core::{
    BookingApi, CatalogApi, Cipher, CredentialStore, LessonStore, PendingWatch, SessionManager,
    StoreDay, WatchStore,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::lifecycle::Lifecycle;
use crate::outcome::{EntryAction, ReserveOutcome};
use crate::refresher::Refresher;
use crate::reserve::AutoReserver;

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("failed to load pending watch entries: {0:#}")]
    LoadPending(anyhow::Error),
}

/// Capabilities a cycle runs against.
#[derive(Clone)]
pub struct CycleDeps {
    pub watches: Arc<dyn WatchStore>,
    pub lessons: Arc<dyn LessonStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub catalog: Arc<dyn CatalogApi>,
    pub booking: Arc<dyn BookingApi>,
    pub cipher: Arc<dyn Cipher>,
    pub notifier: Notifier,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// Pending entries evaluated (lessons from before today are left to cleanup).
    pub checked: usize,
    pub available: usize,
    /// Entries marked notified by this cycle.
    pub notified: usize,
    pub auto_reserved: usize,
    pub outcomes: BTreeMap<ReserveOutcome, usize>,
    pub cleaned_up: usize,
    pub fresh_fetched: usize,
    pub fetch_failed: usize,
    pub store_patched: usize,
}

impl CycleSummary {
    fn record(&mut self, action: &EntryAction, marked: bool) {
        if marked {
            self.notified += 1;
        }
        if let EntryAction::Reserved(outcome) = action {
            *self.outcomes.entry(*outcome).or_default() += 1;
            if *outcome == ReserveOutcome::Success {
                self.auto_reserved += 1;
            }
        }
    }
}

/// Processes available entries and persists what happened to each.
struct EntryWorker {
    reserver: AutoReserver,
    notifier: Notifier,
    lifecycle: Lifecycle,
}

impl EntryWorker {
    async fn process(&self, pending: &PendingWatch) -> (EntryAction, bool) {
        let action = if pending.entry.auto_reserve {
            EntryAction::Reserved(self.reserver.run(pending).await)
        } else {
            let text = messages::seat_open(&pending.lesson);
            let result = self
                .notifier
                .notify(pending.notify_address.as_deref(), &text)
                .await;
            if result.is_sent() {
                EntryAction::SeatOpenSent
            } else {
                debug!("Seat-open message not delivered ({}); retrying next cycle", result);
                EntryAction::SeatOpenDeferred
            }
        };
        let lifecycle = self.lifecycle.clone();
        let (entry_id, disposition) = (pending.entry.id, action.disposition());
        let marked = task::spawn_blocking(move || lifecycle.settle(entry_id, disposition))
            .await
            .unwrap_or_else(|e| {
                warn!(entry_id, "Settling entry aborted: {}", e);
                false
            });
        (action, marked)
    }
}

pub struct WatchCycle {
    watches: Arc<dyn WatchStore>,
    lessons: Arc<dyn LessonStore>,
    refresher: Refresher,
    worker: Arc<EntryWorker>,
    lifecycle: Lifecycle,
    user_limit: Arc<Semaphore>,
    utc_offset: FixedOffset,
}

impl WatchCycle {
    pub fn new(deps: CycleDeps, config: &SchedulerConfig) -> Self {
        let sessions = Arc::new(SessionManager::new(
            deps.credentials,
            deps.booking.clone(),
            deps.cipher,
        ));
        let lifecycle = Lifecycle::new(deps.watches.clone());
        let worker = EntryWorker {
            reserver: AutoReserver::new(sessions, deps.booking, deps.notifier.clone()),
            notifier: deps.notifier,
            lifecycle: lifecycle.clone(),
        };
        Self {
            watches: deps.watches,
            lessons: deps.lessons,
            refresher: Refresher::new(deps.catalog, config.max_concurrent_fetches),
            worker: Arc::new(worker),
            lifecycle,
            user_limit: Arc::new(Semaphore::new(config.max_concurrent_users.max(1))),
            utc_offset: FixedOffset::east_opt(config.utc_offset_minutes * 60)
                .unwrap_or_else(|| Utc.fix()),
        }
    }

    /// The studios' current date.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.utc_offset).date_naive()
    }

    pub async fn run(&self) -> Result<CycleSummary, CycleError> {
        self.run_on(self.today()).await
    }

    /// Run one cycle as if the studios' date were `today`.
    pub async fn run_on(&self, today: NaiveDate) -> Result<CycleSummary, CycleError> {
        let cycle_id = uuid::Uuid::new_v4();
        let span = info_span!("watch_cycle", cycle_id = %cycle_id, %today);
        self.execute(today).instrument(span).await
    }

    // Store calls are synchronous SQLite and run on the blocking pool.
    async fn execute(&self, today: NaiveDate) -> Result<CycleSummary, CycleError> {
        let watches = self.watches.clone();
        let pending = task::spawn_blocking(move || watches.pending_watches())
            .await
            .map_err(|e| CycleError::LoadPending(e.into()))?
            .map_err(CycleError::LoadPending)?;
        let (current, past): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|p| p.lesson.date >= today);
        if !past.is_empty() {
            debug!("Skipping {} entries for past lessons", past.len());
        }

        let mut summary = CycleSummary {
            checked: current.len(),
            ..Default::default()
        };

        let days: BTreeSet<StoreDay> = current
            .iter()
            .map(|p| StoreDay {
                store: p.lesson.store.clone(),
                date: p.lesson.date,
            })
            .collect();
        let freshness = self.refresher.refresh(days).await;
        summary.fresh_fetched = freshness.fetched();
        summary.fetch_failed = freshness.failed().len();
        let (lessons, observed) = (self.lessons.clone(), freshness.clone());
        summary.store_patched = task::spawn_blocking(move || observed.patch(lessons.as_ref()))
            .await
            .unwrap_or_else(|e| {
                warn!("Availability patch aborted: {}", e);
                0
            });

        let mut by_user: BTreeMap<String, Vec<PendingWatch>> = BTreeMap::new();
        for mut pending in current {
            if let Some(slots) = freshness.available_slots(&pending.lesson) {
                pending.lesson.available_slots = slots;
                pending.lesson.is_full = slots == 0;
            }
            if pending.lesson.available_slots == 0 {
                continue;
            }
            summary.available += 1;
            by_user
                .entry(pending.entry.user_id.clone())
                .or_default()
                .push(pending);
        }

        let mut tasks = JoinSet::new();
        for (user_id, entries) in by_user {
            let worker = self.worker.clone();
            let limit = self.user_limit.clone();
            let span = info_span!("watch_user", user_id = %user_id);
            tasks.spawn(
                async move {
                    let _permit = limit.acquire_owned().await.ok();
                    let mut results = Vec::with_capacity(entries.len());
                    for pending in entries {
                        let entry_span = info_span!("watch_entry", entry_id = pending.entry.id);
                        let result = worker.process(&pending).instrument(entry_span).await;
                        results.push(result);
                    }
                    results
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(results) => {
                    for (action, marked) in results {
                        summary.record(&action, marked);
                    }
                }
                Err(e) => error!("Watch task for one user aborted: {}", e),
            }
        }

        let lifecycle = self.lifecycle.clone();
        summary.cleaned_up = task::spawn_blocking(move || lifecycle.cleanup(today))
            .await
            .unwrap_or_else(|e| {
                warn!("Watch cleanup aborted: {}", e);
                0
            });

        info!(
            checked = summary.checked,
            available = summary.available,
            notified = summary.notified,
            auto_reserved = summary.auto_reserved,
            cleaned_up = summary.cleaned_up,
            "Watch cycle complete"
        );
        Ok(summary)
    }
}
