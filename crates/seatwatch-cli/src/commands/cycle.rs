use anyhow::{Context, Result};
use seatwatch_core::{Config, UpstreamClient};
use seatwatch_scheduler::{CycleDeps, WatchCycle, WatchRunner};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{cipher, load_config, notifier, open_store};

fn build_cycle(config: &Config) -> Result<WatchCycle> {
    let store = open_store(config)?;
    let client = Arc::new(UpstreamClient::new(&config.upstream)?);
    let deps = CycleDeps {
        watches: store.clone(),
        lessons: store.clone(),
        credentials: store,
        catalog: client.clone(),
        booking: client,
        cipher: cipher(config)?,
        notifier: notifier(config)?,
    };
    Ok(WatchCycle::new(deps, &config.scheduler))
}

pub async fn run_once(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let summary = build_cycle(&config)?.run().await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to encode cycle summary")?
    );
    Ok(())
}

pub async fn daemon(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let runner = WatchRunner::new(build_cycle(&config)?, &config.scheduler.schedule)?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
        }
        shutdown.cancel();
    });

    info!("Daemon running on schedule {}", config.scheduler.schedule);
    runner.run(cancel).await;
    Ok(())
}
