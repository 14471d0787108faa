//! Bulk dispatch: one message (plus optional media) to many recipients.
//!
//! Recipients are processed strictly one after another with a fixed pause in
//! between, to stay under WhatsApp's rate limits. A failing recipient never
//! stops the batch.

use relay_core::{
    error::RelayError,
    message::{MediaAttachment, OutgoingContent, SendReceipt},
    phone::PhoneNormalizer,
    traits::WhatsAppClient,
};
use relay_sendlog::{LogRecord, LogStore, LogType};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Error label for recipients without a WhatsApp account.
pub const NOT_ON_WHATSAPP: &str = "not_on_whatsapp";

/// Per-item errors kept in a batch summary. Counts stay exact beyond this.
pub const MAX_REPORTED_ERRORS: usize = 100;

/// A bulk send. Attachment bytes are dropped together with the request.
#[derive(Debug, Clone, Default)]
pub struct BulkRequest {
    pub recipients: Vec<String>,
    pub message: String,
    pub image: Option<MediaAttachment>,
    pub document: Option<MediaAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientError {
    pub recipient: String,
    pub error: String,
}

/// Batch summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkSendResult {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
    pub errors: Vec<RecipientError>,
}

impl BulkSendResult {
    fn record_failure(&mut self, recipient: &str, error: String) {
        self.failed += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(RecipientError {
                recipient: recipient.to_string(),
                error,
            });
        }
    }
}

/// Short error label stored in summaries and log entries.
pub(crate) fn failure_label(err: &RelayError) -> String {
    match err {
        RelayError::RecipientUnregistered(_) => NOT_ON_WHATSAPP.to_string(),
        other => other.to_string(),
    }
}

pub struct BulkDispatcher {
    client: Arc<dyn WhatsAppClient>,
    store: LogStore,
    normalizer: PhoneNormalizer,
    inter_send_delay: Duration,
}

impl BulkDispatcher {
    pub fn new(
        client: Arc<dyn WhatsAppClient>,
        store: LogStore,
        normalizer: PhoneNormalizer,
        inter_send_delay: Duration,
    ) -> Self {
        Self {
            client,
            store,
            normalizer,
            inter_send_delay,
        }
    }

    /// Send `request` to every recipient.
    ///
    /// Fails as a whole (nothing sent) only when the client is offline or the
    /// request is empty; everything after that is reported per recipient.
    pub async fn dispatch(&self, request: BulkRequest) -> Result<BulkSendResult, RelayError> {
        if !self.client.is_connected().await {
            return Err(RelayError::NotConnected);
        }

        let recipients: Vec<&str> = request
            .recipients
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect();
        if recipients.is_empty() {
            return Err(RelayError::Validation("phones must be a non-empty list".into()));
        }
        if request.message.trim().is_empty() {
            return Err(RelayError::Validation("message is required".into()));
        }

        let mut result = BulkSendResult {
            total: recipients.len(),
            ..Default::default()
        };
        info!(
            "bulk: sending to {} recipients (image: {}, document: {})",
            result.total,
            request.image.is_some(),
            request.document.is_some()
        );

        for (i, recipient) in recipients.iter().enumerate() {
            let base = LogRecord::new(LogType::ReminderSuccess)
                .field("to", *recipient)
                .field("message", request.message.as_str())
                .field("source", "bulk")
                .field("endpoint", "/api/send-bulk")
                .field("hasImage", request.image.is_some())
                .field("hasDocument", request.document.is_some());

            match self.send_one(recipient, &request).await {
                Ok((jid, receipt)) => {
                    result.sent += 1;
                    self.store
                        .append(base.with_response(json!({
                            "success": true,
                            "jid": jid,
                            "messageId": receipt.id,
                        })))
                        .await;
                }
                Err(e) => {
                    let label = failure_label(&e);
                    warn!("bulk: {recipient} failed: {e}");
                    let mut record = base.with_response(json!({"success": false}));
                    record.kind = LogType::ReminderError;
                    self.store.append(record.with_error(label.clone())).await;
                    result.record_failure(recipient, label);
                }
            }

            if i + 1 < recipients.len() && !self.inter_send_delay.is_zero() {
                tokio::time::sleep(self.inter_send_delay).await;
            }
        }

        info!(
            "bulk: done, {} sent, {} failed of {}",
            result.sent, result.failed, result.total
        );
        Ok(result)
    }

    /// Text first, then image (no caption), then document captioned with its
    /// file name. The first failure ends this recipient.
    async fn send_one(
        &self,
        recipient: &str,
        request: &BulkRequest,
    ) -> Result<(String, SendReceipt), RelayError> {
        let jid = self
            .normalizer
            .normalize(recipient)
            .ok_or_else(|| RelayError::Validation(format!("invalid phone number '{recipient}'")))?;

        let jid = self
            .client
            .get_number_id(&jid)
            .await?
            .ok_or(RelayError::RecipientUnregistered(jid))?
            .jid;

        let receipt = self
            .client
            .send_message(&jid, OutgoingContent::Text(request.message.clone()))
            .await?;

        if let Some(ref image) = request.image {
            self.client
                .send_message(
                    &jid,
                    OutgoingContent::Image {
                        media: image.clone(),
                        caption: None,
                    },
                )
                .await?;
        }

        if let Some(ref document) = request.document {
            self.client
                .send_message(
                    &jid,
                    OutgoingContent::Document {
                        media: document.clone(),
                        caption: Some(document.display_name()),
                    },
                )
                .await?;
        }

        Ok((jid, receipt))
    }
}
