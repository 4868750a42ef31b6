use anyhow::{Context, Result};
use seatwatch_core::{Cipher, CredentialStore, LessonStore, ObservedLesson};
use std::path::Path;
use tracing::info;

use super::{cipher, load_config, open_store};

const CONFIG_TEMPLATE: &str = r#"# seatwatch configuration
# Environment references in string values are expanded when the file is loaded.

[database]
# path = "/var/lib/seatwatch/seatwatch.db"

[upstream]
base_url = "https://booking.example.com"
timeout_secs = 15
session_ttl_minutes = 110

[notify]
# "line" pushes through the LINE Messaging API; "log" only logs.
kind = "log"
access_token = ""

[scheduler]
schedule = "0 */5 * * * *"
max_concurrent_fetches = 4
max_concurrent_users = 4
utc_offset_minutes = 540

[secrets]
encryption_key = "${SEATWATCH_ENCRYPTION_KEY}"
"#;

pub fn init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(config_path, CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Wrote config template to {}", config_path.display());
    }

    match load_config(config_path) {
        Ok(config) => {
            open_store(&config)?;
            println!("Database ready at {}", config.database.path.display());
        }
        Err(e) => {
            println!("Edit the config before continuing: {e:#}");
        }
    }
    Ok(())
}

pub fn link(config_path: &Path, user: &str, email: &str, password: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let cipher = cipher(&config)?;

    let email = cipher.encrypt(email).context("Failed to encrypt email")?;
    let password = cipher.encrypt(password).context("Failed to encrypt password")?;
    store.link_credential(user, &email, &password)?;

    info!(user_id = user, "Linked booking account");
    println!("Linked booking account for {user}; automatic reservations are enabled again.");
    Ok(())
}

pub fn set_address(config_path: &Path, user: &str, address: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let address = Some(address.trim()).filter(|a| !a.is_empty());
    store.set_notify_address(user, address)?;
    match address {
        Some(address) => println!("Push address for {user} set to {address}"),
        None => println!("Push address for {user} cleared"),
    }
    Ok(())
}

/// Parse a schedule export: either a bare array of lessons or the
/// `{"lessons": [...]}` body of the schedule endpoint.
pub(crate) fn parse_lessons(raw: &str) -> Result<Vec<ObservedLesson>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Export {
        Bare(Vec<ObservedLesson>),
        Wrapped { lessons: Vec<ObservedLesson> },
    }

    let export: Export = serde_json::from_str(raw).context("Failed to parse lesson file")?;
    Ok(match export {
        Export::Bare(lessons) | Export::Wrapped { lessons } => lessons,
    })
}

pub fn import_lessons(config_path: &Path, file: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let lessons = parse_lessons(&raw)?;
    let count = lessons.len();
    for observed in lessons {
        let lesson = observed.into_lesson();
        let id = store.upsert_lesson(&lesson)?;
        println!("{id}\t{}", lesson.label());
    }
    info!("Imported {} lessons from {}", count, file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatwatch_core::Config;

    #[test]
    fn test_template_parses_with_key() {
        let raw = CONFIG_TEMPLATE.replace("${SEATWATCH_ENCRYPTION_KEY}", "secret");
        let config = Config::from_toml(&raw).unwrap();
        assert_eq!(config.scheduler.max_concurrent_users, 4);
        assert_eq!(config.secrets.encryption_key, "secret");
    }

    #[test]
    fn test_written_template_loads_with_key_from_env() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, CONFIG_TEMPLATE)?;
        // SAFETY: no other test in this binary reads this variable.
        unsafe { std::env::set_var("SEATWATCH_ENCRYPTION_KEY", "from-env") };

        let config = load_config(&path)?;
        assert_eq!(config.secrets.encryption_key, "from-env");
        assert_eq!(config.upstream.timeout_secs, 15);
        Ok(())
    }

    #[test]
    fn test_parse_both_export_shapes() {
        let lesson = r#"{"date":"2026-10-16","startTime":"19:00","endTime":"19:45",
            "programName":"BB2 Hits","instructor":"Aki","store":"Ginza",
            "sidHash":"abc","availableSlots":0}"#;
        let bare = parse_lessons(&format!("[{lesson}]")).unwrap();
        let wrapped = parse_lessons(&format!(r#"{{"lessons":[{lesson}]}}"#)).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare[0].program_name, "BB2 Hits");
        assert!(parse_lessons("{}").is_err());
    }
}
