//! Push channels and message templates for seatwatch
//!
//! This crate provides the notification path of the watch cycle: the
//! non-fatal [`Notifier`], its transports, and the user-facing texts.

pub mod line;
pub mod messages;
pub mod notifier;

// Re-export main types
pub use line::LinePushChannel;
pub use notifier::{LogChannel, Notifier, NotifyError, NotifyResult, PushChannel, RecordingChannel};
