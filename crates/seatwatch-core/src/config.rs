//! Configuration loading from `~/.seatwatch/config.toml`
//!
//! String values may reference environment variables as `${NAME}`; they are
//! expanded when the file is loaded so secrets can stay out of the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("environment variable {0} referenced in config is not set")]
    MissingEnv(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: config_dir().join("seatwatch.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// How long a fresh login is trusted before it is considered expired.
    pub session_ttl_minutes: i64,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://booking.example.com".to_string(),
            timeout_secs: 15,
            session_ttl_minutes: 110,
            user_agent: format!("seatwatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    /// LINE Messaging API push.
    Line,
    /// Log only; for dry runs.
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub kind: NotifyKind,
    pub endpoint: String,
    pub access_token: String,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            kind: NotifyKind::Log,
            endpoint: "https://api.line.me/v2/bot/message/push".to_string(),
            access_token: String::new(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Six-field cron expression (seconds first).
    pub schedule: String,
    pub max_concurrent_fetches: usize,
    pub max_concurrent_users: usize,
    /// Offset of the studios' local time from UTC, used to decide "today".
    pub utc_offset_minutes: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule: "0 */5 * * * *".to_string(),
            max_concurrent_fetches: 4,
            max_concurrent_users: 4,
            utc_offset_minutes: 9 * 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub encryption_key: String,
}

/// `~/.seatwatch`, or `./.seatwatch` when there is no home directory.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".seatwatch")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading config from {:?}", path);

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let parse_error = |source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        };
        let mut value: toml::Value = toml::from_str(raw).map_err(parse_error)?;
        expand_strings(&mut value)?;
        let config: Config = value.try_into().map_err(parse_error)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.upstream.base_url).map_err(|e| {
            ConfigError::Invalid(format!("upstream.base_url {}: {e}", self.upstream.base_url))
        })?;
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::Invalid("upstream.timeout_secs must be positive".into()));
        }
        if self.upstream.session_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "upstream.session_ttl_minutes must be positive".into(),
            ));
        }
        if self.scheduler.max_concurrent_fetches == 0 || self.scheduler.max_concurrent_users == 0 {
            return Err(ConfigError::Invalid(
                "scheduler concurrency limits must be positive".into(),
            ));
        }
        if self.scheduler.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Invalid(
                "scheduler.utc_offset_minutes must be within a day".into(),
            ));
        }
        cron::Schedule::from_str(&self.scheduler.schedule).map_err(|e| {
            ConfigError::Invalid(format!("scheduler.schedule {}: {e}", self.scheduler.schedule))
        })?;
        if self.secrets.encryption_key.trim().is_empty() {
            return Err(ConfigError::Invalid("secrets.encryption_key is required".into()));
        }
        if self.notify.kind == NotifyKind::Line && self.notify.access_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notify.access_token is required for LINE push".into(),
            ));
        }
        Ok(())
    }
}

/// Expand environment references in every string value, nested tables and
/// arrays included. Keys and comments are left alone.
fn expand_strings(value: &mut toml::Value) -> Result<(), ConfigError> {
    match value {
        toml::Value::String(s) => *s = expand_env(s)?,
        toml::Value::Array(items) => {
            for item in items {
                expand_strings(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                expand_strings(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Replace every `${NAME}` with the value of the environment variable.
fn expand_env(raw: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        let value = std::env::var(name).map_err(|_| ConfigError::MissingEnv(name.to_string()))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
