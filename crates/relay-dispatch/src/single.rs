//! Single sends: plain text and remotely rendered templates.

use relay_core::{
    error::RelayError,
    message::OutgoingContent,
    phone::PhoneNormalizer,
    traits::{TemplateRenderer, WhatsAppClient},
};
use relay_sendlog::{LogRecord, LogStore, LogType};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::bulk::failure_label;

const SEND_ENDPOINT: &str = "/api/send";
const TEMPLATE_ENDPOINT: &str = "/api/send-template";

/// Result of one delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub success: bool,
    pub jid: String,
    pub message_id: String,
}

/// Sends one message at a time, logging every attempt.
#[derive(Clone)]
pub struct DirectSender {
    client: Arc<dyn WhatsAppClient>,
    store: LogStore,
    normalizer: PhoneNormalizer,
}

impl DirectSender {
    pub fn new(client: Arc<dyn WhatsAppClient>, store: LogStore, normalizer: PhoneNormalizer) -> Self {
        Self {
            client,
            store,
            normalizer,
        }
    }

    pub async fn send_text(&self, phone: &str, message: &str) -> Result<SendOutcome, RelayError> {
        self.deliver(phone, message, SEND_ENDPOINT).await
    }

    /// Render `key` with `params`, then send the text. A render failure is
    /// logged as an `error` entry and aborts only this send.
    pub async fn send_template(
        &self,
        renderer: &dyn TemplateRenderer,
        phone: &str,
        key: &str,
        params: &Map<String, Value>,
    ) -> Result<SendOutcome, RelayError> {
        if key.trim().is_empty() {
            return Err(RelayError::Validation("template key is required".into()));
        }
        if !self.client.is_connected().await {
            return Err(RelayError::NotConnected);
        }

        let text = match renderer.render(key, params).await {
            Ok(text) => text,
            Err(e) => {
                warn!("template {key} for {phone} failed: {e}");
                self.store
                    .append(
                        LogRecord::new(LogType::Error)
                            .field("to", phone)
                            .field("source", "api")
                            .field("endpoint", TEMPLATE_ENDPOINT)
                            .field("templateKey", key)
                            .with_error(e.to_string()),
                    )
                    .await;
                return Err(e);
            }
        };

        self.deliver(phone, &text, TEMPLATE_ENDPOINT).await
    }

    async fn deliver(&self, phone: &str, message: &str, endpoint: &str) -> Result<SendOutcome, RelayError> {
        if phone.trim().is_empty() {
            return Err(RelayError::Validation("phone is required".into()));
        }
        if message.trim().is_empty() {
            return Err(RelayError::Validation("message is required".into()));
        }
        if !self.client.is_connected().await {
            return Err(RelayError::NotConnected);
        }

        let base = LogRecord::new(LogType::ReminderSuccess)
            .field("to", phone)
            .field("message", message)
            .field("source", "api")
            .field("endpoint", endpoint);

        match self.send(phone, message).await {
            Ok(outcome) => {
                info!("sent to {} ({})", outcome.jid, outcome.message_id);
                self.store
                    .append(base.with_response(json!({
                        "success": true,
                        "jid": outcome.jid,
                        "messageId": outcome.message_id,
                    })))
                    .await;
                Ok(outcome)
            }
            Err(e) => {
                warn!("send to {phone} failed: {e}");
                let mut record = base.with_response(json!({"success": false}));
                record.kind = LogType::ReminderError;
                self.store.append(record.with_error(failure_label(&e))).await;
                Err(e)
            }
        }
    }

    async fn send(&self, phone: &str, message: &str) -> Result<SendOutcome, RelayError> {
        let jid = self
            .normalizer
            .normalize(phone)
            .ok_or_else(|| RelayError::Validation(format!("invalid phone number '{phone}'")))?;
        let jid = self
            .client
            .get_number_id(&jid)
            .await?
            .ok_or(RelayError::RecipientUnregistered(jid))?
            .jid;
        let receipt = self
            .client
            .send_message(&jid, OutgoingContent::Text(message.to_string()))
            .await?;
        Ok(SendOutcome {
            success: true,
            jid,
            message_id: receipt.id,
        })
    }
}
