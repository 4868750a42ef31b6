//! Periodic execution of the watch cycle

use anyhow::{Context, Result};
use chrono::Utc;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cycle::WatchCycle;

/// Runs [`WatchCycle`] on a cron schedule until cancelled.
///
/// Cycles run one after another in a single task, so two cycles never
/// overlap. A cycle that outlasts its slot simply delays the next one.
pub struct WatchRunner {
    cycle: WatchCycle,
    schedule: cron::Schedule,
}

impl WatchRunner {
    pub fn new(cycle: WatchCycle, schedule: &str) -> Result<Self> {
        let schedule = cron::Schedule::from_str(schedule)
            .with_context(|| format!("Invalid cron schedule: {schedule}"))?;
        Ok(Self { cycle, schedule })
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!("Watch runner started");
        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                warn!("Schedule has no upcoming runs; stopping");
                break;
            };
            let delay = (next - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Watch runner stopping");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    match self.cycle.run().await {
                        Ok(summary) => info!(
                            notified = summary.notified,
                            auto_reserved = summary.auto_reserved,
                            "Scheduled cycle finished"
                        ),
                        Err(e) => error!("Scheduled cycle failed: {}", e),
                    }
                }
            }
        }
    }
}
