//! Push delivery with a non-fatal contract
//!
//! Transports implement [`PushChannel`]. Callers talk to [`Notifier`], which
//! never fails: it reports what happened as a [`NotifyResult`] so the caller
//! can decide whether to retry next cycle.

use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("push request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("push endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("push channel unavailable: {0}")]
    Unavailable(String),
}

/// Trait that all push transports implement
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Deliver `text` to `address`
    async fn send(&self, address: &str, text: &str) -> Result<(), NotifyError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyResult {
    Sent,
    /// The user has no push address; nothing was attempted.
    NoAddress,
    Failed(String),
}

impl NotifyResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

impl fmt::Display for NotifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::NoAddress => write!(f, "no address"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Front door for user-facing messages.
#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn PushChannel>,
}

impl Notifier {
    pub fn new(channel: Arc<dyn PushChannel>) -> Self {
        info!("Notifier using {} channel", channel.name());
        Self { channel }
    }

    pub async fn notify(&self, address: Option<&str>, text: &str) -> NotifyResult {
        let Some(address) = address.filter(|a| !a.trim().is_empty()) else {
            info!("No push address; message not sent");
            debug!("Unsent message: {}", text);
            return NotifyResult::NoAddress;
        };

        match self.channel.send(address, text).await {
            Ok(()) => {
                debug!("Push delivered via {}", self.channel.name());
                NotifyResult::Sent
            }
            Err(e) => {
                warn!("Push delivery via {} failed: {}", self.channel.name(), e);
                NotifyResult::Failed(e.to_string())
            }
        }
    }
}

/// Dry-run transport: logs instead of sending.
pub struct LogChannel;

#[async_trait]
impl PushChannel for LogChannel {
    async fn send(&self, address: &str, text: &str) -> Result<(), NotifyError> {
        info!(address, "[dry-run push] {}", text);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Transport that keeps every message in memory. Useful for tests and for
/// inspecting what a cycle would have sent.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingChannel {
    /// A channel whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// `(address, text)` pairs delivered so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PushChannel for RecordingChannel {
    async fn send(&self, address: &str, text: &str) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Unavailable("recording channel set to fail".into()));
        }
        self.sent
            .lock()
            .map_err(|_| NotifyError::Unavailable("recording channel poisoned".into()))?
            .push((address.to_string(), text.to_string()));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
