use crate::{
    error::RelayError,
    message::{ChatSummary, DueTask, HistoricalMessage, NumberId, OutgoingContent, SendReceipt},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// Marker text every formatted task reminder starts with.
///
/// The backfill scan uses it to recognize reminders in WhatsApp history.
pub const REMINDER_MARKER: &str = "Task reminder";

/// WhatsApp client: the transport.
///
/// The relay never speaks the WhatsApp protocol itself; every send, lookup and
/// history read goes through an implementation of this trait.
#[async_trait]
pub trait WhatsAppClient: Send + Sync {
    /// Whether the session is ready to send.
    async fn is_connected(&self) -> bool;

    /// Send one message to a chat id (`digits@c.us`).
    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
    ) -> Result<SendReceipt, RelayError>;

    /// Look up WhatsApp registration. `Ok(None)` means the number has no account.
    async fn get_number_id(&self, jid: &str) -> Result<Option<NumberId>, RelayError>;

    /// List known conversations.
    async fn get_chats(&self) -> Result<Vec<ChatSummary>, RelayError>;

    /// Fetch up to `limit` most recent messages of a conversation.
    async fn fetch_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoricalMessage>, RelayError>;
}

/// Source of tasks that need a reminder on a given date.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Human-readable source name (used as the log `source` tag).
    fn name(&self) -> &str;

    /// Tasks active on `date` whose assignee has a phone number.
    ///
    /// With `only_unmarked`, tasks already flagged as auto-sent for `date` are skipped
    /// (sources that cannot track this ignore the flag).
    async fn due_tasks(
        &self,
        date: NaiveDate,
        only_unmarked: bool,
    ) -> Result<Vec<DueTask>, RelayError>;

    /// Flag a task as reminded for `date`.
    async fn mark_sent(&self, _task_id: i64, _date: NaiveDate) -> Result<(), RelayError> {
        Ok(())
    }
}

/// Remote template rendering.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(&self, key: &str, params: &Map<String, Value>) -> Result<String, RelayError>;
}

/// Decides whether a historical message body is one of our reminders.
pub trait ReminderMatcher: Send + Sync {
    fn looks_like_reminder(&self, text: &str) -> bool;
}

/// Substring match on one or more marker strings.
#[derive(Debug, Clone)]
pub struct MarkerMatcher {
    markers: Vec<String>,
}

impl MarkerMatcher {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }
}

impl Default for MarkerMatcher {
    fn default() -> Self {
        Self::new(vec![REMINDER_MARKER.to_string()])
    }
}

impl ReminderMatcher for MarkerMatcher {
    fn looks_like_reminder(&self, text: &str) -> bool {
        self.markers
            .iter()
            .any(|m| !m.is_empty() && text.contains(m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_matcher_default() {
        let m = MarkerMatcher::default();
        assert!(m.looks_like_reminder("📋 *Task reminder*\nHello Sara"));
        assert!(!m.looks_like_reminder("Hello, see you tomorrow"));
    }

    #[test]
    fn test_marker_matcher_ignores_empty_markers() {
        let m = MarkerMatcher::new(vec![String::new()]);
        assert!(!m.looks_like_reminder("anything"));
    }
}
