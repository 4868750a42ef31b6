//! Read-only calls against a member's booking account

use anyhow::{Context, Result};
use seatwatch_core::{BookingApi, Config, SessionManager, UpstreamClient, UpstreamError, UpstreamSession};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::{cipher, load_config, open_store};

struct Account {
    client: Arc<UpstreamClient>,
    sessions: SessionManager,
}

fn connect(config: &Config) -> Result<Account> {
    let client = Arc::new(UpstreamClient::new(&config.upstream)?);
    let sessions = SessionManager::new(open_store(config)?, client.clone(), cipher(config)?);
    Ok(Account { client, sessions })
}

impl Account {
    /// Reuses a cached session when one is still valid; a session revoked
    /// upstream is replaced by one fresh login.
    async fn call<T, F, Fut>(&self, user: &str, call: F) -> Result<T>
    where
        F: Fn(Arc<UpstreamClient>, UpstreamSession) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        self.sessions
            .with_session(user, |session| call(self.client.clone(), session))
            .await
            .with_context(|| format!("Booking account call failed for {user}"))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode response")?
    );
    Ok(())
}

pub async fn history(config_path: &Path, user: &str, page: u32) -> Result<()> {
    let config = load_config(config_path)?;
    let items = connect(&config)?
        .call(user, |client, session| async move {
            client.lesson_history(&session, page).await
        })
        .await?;
    print_json(&items)
}

pub async fn profile(config_path: &Path, user: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let profile = connect(&config)?
        .call(user, |client, session| async move { client.profile(&session).await })
        .await?;
    print_json(&profile)
}

pub async fn tickets(config_path: &Path, user: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let tickets = connect(&config)?
        .call(user, |client, session| async move { client.tickets(&session).await })
        .await?;
    print_json(&tickets)
}
