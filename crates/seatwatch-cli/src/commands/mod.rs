//! Command implementations and the wiring they share

pub mod account;
pub mod cycle;
pub mod setup;
pub mod watch;

use anyhow::{Context, Result};
use seatwatch_channels::{LinePushChannel, LogChannel, Notifier, PushChannel};
use seatwatch_core::config::NotifyKind;
use seatwatch_core::{AesGcmCipher, Config};
use seatwatch_store::SqliteStore;
use std::path::Path;
use std::sync::Arc;

pub(crate) fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| {
        format!(
            "Failed to load config from {} (run `seatwatch init` first)",
            path.display()
        )
    })
}

pub(crate) fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    Ok(Arc::new(store))
}

pub(crate) fn cipher(config: &Config) -> Result<Arc<AesGcmCipher>> {
    let cipher = AesGcmCipher::from_passphrase(&config.secrets.encryption_key)
        .context("Failed to initialize credential cipher")?;
    Ok(Arc::new(cipher))
}

pub(crate) fn notifier(config: &Config) -> Result<Notifier> {
    let channel: Arc<dyn PushChannel> = match config.notify.kind {
        NotifyKind::Line => Arc::new(
            LinePushChannel::new(&config.notify).context("Failed to set up LINE push channel")?,
        ),
        NotifyKind::Log => Arc::new(LogChannel),
    };
    Ok(Notifier::new(channel))
}
