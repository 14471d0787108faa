//! Daily reminder run.

use chrono::{NaiveDate, Utc};
use relay_core::{
    error::RelayError,
    message::{DueTask, OutgoingContent, SendReceipt},
    phone::PhoneNormalizer,
    traits::{TaskSource, WhatsAppClient},
};
use relay_sendlog::{LogRecord, LogStore, LogType};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::format::format_task_reminder;
use crate::bulk::MAX_REPORTED_ERRORS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskError {
    pub task_id: i64,
    pub recipient: String,
    pub error: String,
}

/// Summary of one run. `ok` is false when the run could not start or the
/// task list could not be fetched; per-task failures leave it true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub ok: bool,
    pub skipped: bool,
    pub date: NaiveDate,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub errors: Vec<TaskError>,
}

impl RunResult {
    fn new(date: NaiveDate) -> Self {
        Self {
            ok: true,
            skipped: false,
            date,
            total: 0,
            sent: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }
}

pub struct ReminderRunner {
    client: Arc<dyn WhatsAppClient>,
    source: Arc<dyn TaskSource>,
    store: LogStore,
    normalizer: PhoneNormalizer,
    only_send_unmarked: bool,
    inter_send_delay: Duration,
}

impl ReminderRunner {
    pub fn new(
        client: Arc<dyn WhatsAppClient>,
        source: Arc<dyn TaskSource>,
        store: LogStore,
        normalizer: PhoneNormalizer,
        only_send_unmarked: bool,
        inter_send_delay: Duration,
    ) -> Self {
        Self {
            client,
            source,
            store,
            normalizer,
            only_send_unmarked,
            inter_send_delay,
        }
    }

    /// Today's date in the relay timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.store.timezone()).date_naive()
    }

    fn record(&self, kind: LogType, date: NaiveDate) -> LogRecord {
        LogRecord::new(kind)
            .with_date(date)
            .field("source", self.source.name())
    }

    /// Send every reminder due on `date`.
    pub async fn run(&self, date: NaiveDate) -> RunResult {
        let mut result = RunResult::new(date);

        if !self.client.is_connected().await {
            warn!("reminders for {date}: whatsapp not connected, skipping");
            self.store
                .append(
                    self.record(LogType::ReminderError, date)
                        .with_error(RelayError::NotConnected.kind()),
                )
                .await;
            result.ok = false;
            result.skipped = true;
            return result;
        }

        self.store
            .append(self.record(LogType::ReminderStart, date))
            .await;

        let tasks = match self.source.due_tasks(date, self.only_send_unmarked).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("reminders for {date}: fetching tasks failed: {e}");
                self.store
                    .append(
                        self.record(LogType::ReminderError, date)
                            .with_error(e.to_string()),
                    )
                    .await;
                result.ok = false;
                return result;
            }
        };

        result.total = tasks.len();
        info!(
            "reminders for {date}: {} tasks from {}",
            tasks.len(),
            self.source.name()
        );
        self.store
            .append(
                self.record(LogType::ReminderTasksFound, date)
                    .field("tasks", serde_json::to_value(&tasks).unwrap_or_default()),
            )
            .await;

        for (i, task) in tasks.iter().enumerate() {
            let message = format_task_reminder(task);
            let base = self
                .record(LogType::ReminderSuccess, date)
                .field("to", task.assignee_phone.as_str())
                .field("taskId", task.id)
                .field("message", message.as_str());

            match self.send(task, message).await {
                Ok((jid, receipt)) => {
                    result.sent += 1;
                    self.store
                        .append(base.with_response(json!({
                            "success": true,
                            "jid": jid,
                            "messageId": receipt.id,
                        })))
                        .await;
                    if let Err(e) = self.source.mark_sent(task.id, date).await {
                        warn!("reminders: could not mark task {} as sent: {e}", task.id);
                    }
                }
                Err(e) => {
                    warn!("reminders: task {} to {} failed: {e}", task.id, task.assignee_phone);
                    let mut record = base.with_response(json!({"success": false}));
                    record.kind = LogType::ReminderError;
                    self.store.append(record.with_error(e.to_string())).await;

                    result.failed += 1;
                    if result.errors.len() < MAX_REPORTED_ERRORS {
                        result.errors.push(TaskError {
                            task_id: task.id,
                            recipient: task.assignee_phone.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            if i + 1 < tasks.len() && !self.inter_send_delay.is_zero() {
                tokio::time::sleep(self.inter_send_delay).await;
            }
        }

        self.store
            .append(
                self.record(LogType::ReminderComplete, date)
                    .field("total", result.total)
                    .field("sent", result.sent)
                    .field("failed", result.failed),
            )
            .await;
        info!(
            "reminders for {date}: {} sent, {} failed of {}",
            result.sent, result.failed, result.total
        );
        result
    }

    async fn send(&self, task: &DueTask, message: String) -> Result<(String, SendReceipt), RelayError> {
        let jid = self
            .normalizer
            .normalize(&task.assignee_phone)
            .ok_or_else(|| {
                RelayError::Validation(format!("invalid phone number '{}'", task.assignee_phone))
            })?;
        let receipt = self
            .client
            .send_message(&jid, OutgoingContent::Text(message))
            .await?;
        Ok((jid, receipt))
    }
}
