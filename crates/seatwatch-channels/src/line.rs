//! LINE Messaging API push transport

use async_trait::async_trait;
use seatwatch_core::config::NotifyConfig;
use std::time::Duration;
use tracing::debug;

use crate::notifier::{NotifyError, PushChannel};

/// LINE caps a text message at 5000 characters.
const MAX_TEXT_CHARS: usize = 5000;

/// Sends text messages through the LINE push endpoint.
pub struct LinePushChannel {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl LinePushChannel {
    /// Create a LINE push channel
    ///
    /// # Arguments
    /// * `config` - endpoint, channel access token and request timeout
    pub fn new(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        debug!(
            "LINE push configured: endpoint={}, token={}",
            config.endpoint,
            if config.access_token.is_empty() { "missing" } else { "present" }
        );
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            access_token: config.access_token.clone(),
        })
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT_CHARS).collect()
}

#[async_trait]
impl PushChannel for LinePushChannel {
    async fn send(&self, address: &str, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "to": address,
            "messages": [{ "type": "text", "text": truncate(text) }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "line"
    }
}
