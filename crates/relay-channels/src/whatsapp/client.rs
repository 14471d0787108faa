//! `WhatsAppClient` implementation over the bridge HTTP API.

use super::WhatsAppBridge;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use relay_core::{
    error::RelayError,
    message::{ChatSummary, HistoricalMessage, MediaAttachment, NumberId, OutgoingContent, SendReceipt},
    traits::WhatsAppClient,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use tracing::{debug, error, warn};

/// Retry delays for idempotent bridge reads: 500ms, 1s, 2s.
///
/// Sends are never retried here; a partially delivered message must not be
/// duplicated behind the caller's back.
const RETRY_DELAYS_MS: [u64; 3] = [500, 1000, 2000];

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct NumberResponse {
    #[serde(default)]
    registered: bool,
    #[serde(default)]
    jid: Option<String>,
}

/// Run an idempotent bridge read with retry and backoff.
async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, RelayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RelayError>>,
{
    let mut last_err = None;

    for (attempt, delay_ms) in RETRY_DELAYS_MS.iter().enumerate() {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let attempt_num = attempt + 1;
                if attempt_num < RETRY_DELAYS_MS.len() {
                    warn!(
                        "bridge {what} attempt {attempt_num}/{} failed: {e}, retrying in {delay_ms}ms",
                        RETRY_DELAYS_MS.len()
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
                } else {
                    error!(
                        "bridge {what} attempt {attempt_num}/{} failed: {e}, giving up",
                        RETRY_DELAYS_MS.len()
                    );
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| RelayError::Send(format!("bridge {what} failed"))))
}

fn media_json(kind: &str, media: &MediaAttachment, caption: &Option<String>) -> Value {
    json!({
        "type": kind,
        "mimetype": media.mime_type,
        "filename": media.filename,
        "data": BASE64.encode(&media.data),
        "caption": caption,
    })
}

fn content_json(content: &OutgoingContent) -> Value {
    match content {
        OutgoingContent::Text(text) => json!({"type": "text", "text": text}),
        OutgoingContent::Image { media, caption } => media_json("image", media, caption),
        OutgoingContent::Document { media, caption } => media_json("document", media, caption),
    }
}

impl WhatsAppBridge {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GET a JSON document, mapping transport and status failures to `Send`.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, RelayError> {
        let resp = self
            .authorized(self.http.get(self.url(path)))
            .send()
            .await
            .map_err(|e| RelayError::Send(format!("bridge request {path} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Send(format!(
                "bridge {path} returned {status}: {body}"
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| RelayError::Send(format!("bridge {path} returned invalid json: {e}")))
    }
}

#[async_trait]
impl WhatsAppClient for WhatsAppBridge {
    async fn is_connected(&self) -> bool {
        self.connection.is_ready()
    }

    async fn send_message(
        &self,
        jid: &str,
        content: OutgoingContent,
    ) -> Result<SendReceipt, RelayError> {
        let body = json!({"chatId": jid, "content": content_json(&content)});

        let resp = self
            .authorized(self.http.post(self.url("/messages")))
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Send(format!("bridge send to {jid} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Send(format!(
                "bridge send to {jid} returned {status}: {body}"
            )));
        }

        let sent: SendResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Send(format!("bridge send returned invalid json: {e}")))?;

        debug!("whatsapp {} sent to {jid}: {}", content.kind(), sent.id);
        Ok(SendReceipt { id: sent.id })
    }

    async fn get_number_id(&self, jid: &str) -> Result<Option<NumberId>, RelayError> {
        let path = format!("/numbers/{jid}");
        let path = path.as_str();
        with_retry("number lookup", || async move {
            let resp = self
                .authorized(self.http.get(self.url(path)))
                .send()
                .await
                .map_err(|e| RelayError::Send(format!("bridge lookup of {jid} failed: {e}")))?;

            let status = resp.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(RelayError::Send(format!(
                    "bridge lookup of {jid} returned {status}"
                )));
            }

            let found: NumberResponse = resp.json().await.map_err(|e| {
                RelayError::Send(format!("bridge lookup returned invalid json: {e}"))
            })?;

            Ok(found.registered.then(|| NumberId {
                jid: found.jid.unwrap_or_else(|| jid.to_string()),
            }))
        })
        .await
    }

    async fn get_chats(&self) -> Result<Vec<ChatSummary>, RelayError> {
        with_retry("chat list", || self.get_json::<Vec<ChatSummary>>("/chats")).await
    }

    async fn fetch_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoricalMessage>, RelayError> {
        let path = format!("/chats/{chat_id}/messages?limit={limit}");
        let path = path.as_str();
        with_retry("message history", || {
            self.get_json::<Vec<HistoricalMessage>>(path)
        })
        .await
    }
}
