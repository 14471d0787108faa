//! Send-log record types.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    ReminderStart,
    ReminderTasksFound,
    ReminderSuccess,
    ReminderError,
    ReminderComplete,
    Error,
    Info,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReminderStart => "reminder_start",
            Self::ReminderTasksFound => "reminder_tasks_found",
            Self::ReminderSuccess => "reminder_success",
            Self::ReminderError => "reminder_error",
            Self::ReminderComplete => "reminder_complete",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

/// Sanitized request context stored with an entry.
///
/// `message` and `message_preview` are mutually exclusive; which one is set
/// depends on the store's message mode. `message_length` is always the
/// original character count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub message_preview: Option<String>,
    #[serde(default)]
    pub message_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phones_count: Option<usize>,
    /// Other scalar context fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Allow-listed response fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// One persisted log entry. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<FixedOffset>,
    #[serde(rename = "type")]
    pub kind: LogType,
    pub date: NaiveDate,
    #[serde(default)]
    pub request: LogRequest,
    #[serde(default)]
    pub response: LogResponse,
    #[serde(default)]
    pub error: Option<String>,
    /// Set only on entries reconstructed from WhatsApp history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backfill_id: Option<String>,
}

/// A candidate entry, before sanitization and identity.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub kind: LogType,
    /// Event date; defaults to the timestamp's date in the store timezone.
    pub date: Option<NaiveDate>,
    pub request: Map<String, Value>,
    pub response: Option<Value>,
    pub error: Option<String>,
}

impl LogRecord {
    pub fn new(kind: LogType) -> Self {
        Self {
            kind,
            date: None,
            request: Map::new(),
            response: None,
            error: None,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Add one request context field.
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.request.insert(key.to_string(), value.into());
        self
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Filters for reading the log.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    #[serde(rename = "type", default)]
    pub kind: Option<LogType>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Denormalized view of one successfully sent message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessageView {
    pub id: String,
    /// `YYYY-MM-DD HH:MM:SS` in the store timezone.
    pub sent_at: String,
    pub to: Option<String>,
    pub task_id: Option<Value>,
    /// Full text or preview, whichever was stored.
    pub message: Option<String>,
    pub chat_id: Option<String>,
    pub message_length: usize,
    pub is_preview: bool,
}

impl SentMessageView {
    pub(crate) fn from_entry(entry: &LogEntry, tz: &chrono_tz::Tz) -> Self {
        let is_preview = entry.request.message.is_none() && entry.request.message_preview.is_some();
        Self {
            id: entry.id.clone(),
            sent_at: entry
                .timestamp
                .with_timezone(tz)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            to: entry.request.to.clone(),
            task_id: entry.request.task_id.clone(),
            message: entry
                .request
                .message
                .clone()
                .or_else(|| entry.request.message_preview.clone()),
            chat_id: entry.response.jid.clone(),
            message_length: entry.request.message_length,
            is_preview,
        }
    }
}
