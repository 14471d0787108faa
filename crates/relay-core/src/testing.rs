//! In-memory collaborator doubles shared by the workspace's tests.

use crate::{
    error::RelayError,
    message::{ChatSummary, DueTask, HistoricalMessage, NumberId, OutgoingContent, SendReceipt},
    traits::{TaskSource, TemplateRenderer, WhatsAppClient},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// One recorded send.
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub jid: String,
    pub kind: &'static str,
    pub text: Option<String>,
    pub caption: Option<String>,
}

/// Scriptable WhatsApp client.
#[derive(Default)]
pub struct MockWhatsApp {
    connected: AtomicBool,
    unregistered: Mutex<HashSet<String>>,
    failing_text: Mutex<HashSet<String>>,
    failing_media: Mutex<HashSet<String>>,
    chats: Mutex<Vec<ChatSummary>>,
    history: Mutex<HashMap<String, Vec<HistoricalMessage>>>,
    failing_history: Mutex<HashSet<String>>,
    pub sent: Mutex<Vec<SentRecord>>,
    pub lookups: Mutex<Vec<String>>,
    counter: AtomicUsize,
}

impl MockWhatsApp {
    /// A connected client where every number is registered.
    pub fn connected() -> Self {
        let mock = Self::default();
        mock.connected.store(true, Ordering::SeqCst);
        mock
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn unregister(&self, jid: &str) {
        self.unregistered.lock().unwrap().insert(jid.to_string());
    }

    pub fn fail_text_to(&self, jid: &str) {
        self.failing_text.lock().unwrap().insert(jid.to_string());
    }

    pub fn fail_media_to(&self, jid: &str) {
        self.failing_media.lock().unwrap().insert(jid.to_string());
    }

    pub fn add_chat(&self, chat: ChatSummary, messages: Vec<HistoricalMessage>) {
        self.history
            .lock()
            .unwrap()
            .insert(chat.id.clone(), messages);
        self.chats.lock().unwrap().push(chat);
    }

    pub fn fail_history_of(&self, chat_id: &str) {
        self.failing_history
            .lock()
            .unwrap()
            .insert(chat_id.to_string());
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WhatsAppClient for MockWhatsApp {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
    ) -> Result<SendReceipt, RelayError> {
        let failing = match content {
            OutgoingContent::Text(_) => &self.failing_text,
            _ => &self.failing_media,
        };
        if failing.lock().unwrap().contains(jid) {
            return Err(RelayError::Send(format!(
                "mock {} send to {jid} failed",
                content.kind()
            )));
        }
        let (text, caption) = match &content {
            OutgoingContent::Text(t) => (Some(t.clone()), None),
            OutgoingContent::Image { caption, .. } | OutgoingContent::Document { caption, .. } => {
                (None, caption.clone())
            }
        };
        self.sent.lock().unwrap().push(SentRecord {
            jid: jid.to_string(),
            kind: content.kind(),
            text,
            caption,
        });
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(SendReceipt {
            id: format!("true_{jid}_MOCK{n}"),
        })
    }

    async fn get_number_id(&self, jid: &str) -> Result<Option<NumberId>, RelayError> {
        self.lookups.lock().unwrap().push(jid.to_string());
        if self.unregistered.lock().unwrap().contains(jid) {
            return Ok(None);
        }
        Ok(Some(NumberId {
            jid: jid.to_string(),
        }))
    }

    async fn get_chats(&self) -> Result<Vec<ChatSummary>, RelayError> {
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn fetch_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoricalMessage>, RelayError> {
        if self.failing_history.lock().unwrap().contains(chat_id) {
            return Err(RelayError::Send(format!("history of {chat_id} unavailable")));
        }
        let all = self
            .history
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .unwrap_or_default();
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }
}

/// Fixed task list; records `mark_sent` calls.
#[derive(Default)]
pub struct MockTaskSource {
    pub tasks: Mutex<Vec<DueTask>>,
    pub marked: Mutex<Vec<(i64, NaiveDate)>>,
    pub fail: AtomicBool,
}

impl MockTaskSource {
    pub fn with_tasks(tasks: Vec<DueTask>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        let source = Self::default();
        source.fail.store(true, Ordering::SeqCst);
        source
    }
}

#[async_trait]
impl TaskSource for MockTaskSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn due_tasks(
        &self,
        _date: NaiveDate,
        _only_unmarked: bool,
    ) -> Result<Vec<DueTask>, RelayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RelayError::Source("mock source down".into()));
        }
        Ok(self.tasks.lock().unwrap().clone())
    }

    async fn mark_sent(&self, task_id: i64, date: NaiveDate) -> Result<(), RelayError> {
        self.marked.lock().unwrap().push((task_id, date));
        Ok(())
    }
}

/// Renders `"{key}: k=v, ..."`, or fails when built with `failing()`.
#[derive(Default)]
pub struct MockRenderer {
    fail: bool,
}

impl MockRenderer {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl TemplateRenderer for MockRenderer {
    async fn render(&self, key: &str, params: &Map<String, Value>) -> Result<String, RelayError> {
        if self.fail {
            return Err(RelayError::Render(format!("template '{key}' unavailable")));
        }
        let mut parts: Vec<String> = params
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect();
        parts.sort();
        Ok(format!("{key}: {}", parts.join(", ")))
    }
}

/// A due task with every field populated.
pub fn sample_task(id: i64, phone: &str) -> DueTask {
    DueTask {
        id,
        description: Some(format!("Task number {id}")),
        status: Some("in_progress".into()),
        percentage: Some(40.0),
        task_type: Some("task".into()),
        start_date: Some("2024-01-10".into()),
        end_date: Some("2024-01-20".into()),
        list_title: Some("Sprint 3".into()),
        project_title: Some("Website".into()),
        assignee_name: Some("Sara".into()),
        assignee_phone: phone.to_string(),
    }
}
