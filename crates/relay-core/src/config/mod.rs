mod defaults;
mod whatsapp;


pub use whatsapp::*;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::RelayError;
use defaults::*;

/// Top-level wa-relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub sendlog: SendLogConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
}

/// General relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// IANA timezone used for log timestamps, date filters and the daily schedule.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            timezone: default_timezone(),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Bearer token for API authentication. Empty = no auth (for local-only use).
    #[serde(default)]
    pub api_key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            api_key: String::new(),
        }
    }
}

/// How much of a message body the send log keeps.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageMode {
    /// Complete text.
    Full,
    /// First 220 characters plus an ellipsis (default).
    #[default]
    Preview,
    /// Length only.
    None,
}

impl MessageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Preview => "preview",
            Self::None => "none",
        }
    }
}

/// Send-log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendLogConfig {
    /// JSON file, relative to `data_dir` unless absolute.
    #[serde(default = "default_log_file")]
    pub file: String,
    #[serde(default = "default_max_logs")]
    pub max_logs: usize,
    /// Skip appends whose id is already stored.
    #[serde(default = "default_true")]
    pub dedup: bool,
    #[serde(default)]
    pub message_mode: MessageMode,
}

impl Default for SendLogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            max_logs: default_max_logs(),
            dedup: true,
            message_mode: MessageMode::default(),
        }
    }
}

/// Bulk-send configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    #[serde(default = "default_inter_send_delay")]
    pub inter_send_delay_ms: u64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            inter_send_delay_ms: default_inter_send_delay(),
        }
    }
}

/// Where reminder tasks come from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderSourceKind {
    /// Direct SQL query against the task database.
    #[default]
    Database,
    /// Remote task API.
    Api,
}

/// Daily reminder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub source: ReminderSourceKind,
    /// Local time of day (`HH:MM`) in the relay timezone.
    #[serde(default = "default_send_at")]
    pub send_at: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Skip tasks already flagged as auto-sent today (database source only).
    #[serde(default = "default_true")]
    pub only_send_unmarked: bool,
    #[serde(default = "default_inter_send_delay")]
    pub inter_send_delay_ms: u64,
    /// sqlx URL of the task database (e.g. `sqlite:///srv/tasks.db`).
    #[serde(default)]
    pub database_url: String,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_token: String,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source: ReminderSourceKind::default(),
            send_at: default_send_at(),
            poll_interval_secs: default_poll_interval(),
            only_send_unmarked: true,
            inter_send_delay_ms: default_inter_send_delay(),
            database_url: String::new(),
            api_url: String::new(),
            api_token: String::new(),
        }
    }
}

/// Defaults for the history backfill scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "default_since_days")]
    pub since_days: i64,
    #[serde(default = "default_limit_per_chat")]
    pub limit_per_chat: usize,
    #[serde(default = "default_max_chats")]
    pub max_chats: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            since_days: default_since_days(),
            limit_per_chat: default_limit_per_chat(),
            max_chats: default_max_chats(),
        }
    }
}

impl Config {
    /// Parsed operational timezone.
    pub fn timezone(&self) -> Result<Tz, RelayError> {
        parse_timezone(&self.relay.timezone)
    }

    /// Parsed daily reminder time.
    pub fn send_at(&self) -> Result<NaiveTime, RelayError> {
        NaiveTime::parse_from_str(self.reminders.send_at.trim(), "%H:%M").map_err(|e| {
            RelayError::Config(format!(
                "invalid reminders.send_at '{}': {e}",
                self.reminders.send_at
            ))
        })
    }

    /// Absolute path of the send-log JSON file.
    pub fn sendlog_path(&self) -> PathBuf {
        let file = shellexpand(&self.sendlog.file);
        let path = Path::new(&file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&shellexpand(&self.relay.data_dir)).join(path)
        }
    }

    /// Directory for rolling trace logs.
    pub fn logs_dir(&self) -> PathBuf {
        Path::new(&shellexpand(&self.relay.data_dir)).join("logs")
    }

    /// Override secrets from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override secrets from an arbitrary key lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("RELAY_API_KEY") {
            self.api.api_key = v;
        }
        if let Some(v) = get("RELAY_BRIDGE_URL") {
            self.whatsapp.bridge_url = v;
        }
        if let Some(v) = get("RELAY_BRIDGE_TOKEN") {
            self.whatsapp.bridge_token = v;
        }
        if let Some(v) = get("RELAY_DATABASE_URL") {
            self.reminders.database_url = v;
        }
        if let Some(v) = get("RELAY_TASKS_API_TOKEN") {
            self.reminders.api_token = v;
        }
        if let Some(v) = get("RELAY_TEMPLATE_SECRET") {
            self.templates.secret = v;
        }
    }

    /// Reject configurations that cannot start.
    pub fn validate(&self) -> Result<(), RelayError> {
        self.timezone()?;
        if self.sendlog.max_logs == 0 {
            return Err(RelayError::Config(
                "sendlog.max_logs must be at least 1".into(),
            ));
        }
        if self.reminders.enabled {
            self.send_at()?;
            match self.reminders.source {
                ReminderSourceKind::Database if self.reminders.database_url.trim().is_empty() => {
                    return Err(RelayError::Config(
                        "reminders.database_url is required for the database source \
                         (set it in config.toml or RELAY_DATABASE_URL)"
                            .into(),
                    ));
                }
                ReminderSourceKind::Api if self.reminders.api_url.trim().is_empty() => {
                    return Err(RelayError::Config(
                        "reminders.api_url is required for the api source".into(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, RelayError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| RelayError::Config(format!("invalid timezone '{name}': {e}")))
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, RelayError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| RelayError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| RelayError::Config(format!("failed to parse config: {}", e)))?;

    Ok(config)
}
