//! seatwatch-scheduler - the cancellation-watch pipeline
//!
//! This crate provides:
//! - Freshness refresh of seat counts per (studio, date)
//! - Evaluation of pending watch entries and the seat-open path
//! - The auto-reservation state machine
//! - Lifecycle writes (terminal flag, cleanup of past lessons)
//! - A cron-driven runner

pub mod cycle;
pub mod lifecycle;
pub mod outcome;
pub mod refresher;
pub mod reserve;
pub mod runner;

pub use cycle::{CycleDeps, CycleError, CycleSummary, WatchCycle};
pub use lifecycle::Lifecycle;
pub use outcome::{Disposition, EntryAction, ReserveOutcome};
pub use refresher::{Freshness, Refresher};
pub use reserve::{AutoReserver, Resolution, Step};
pub use runner::WatchRunner;
