use serde::{Deserialize, Serialize};

/// A media file attached to an outgoing message.
///
/// Bytes are owned by the request that carries them and dropped when the
/// dispatch that uses them returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub mime_type: String,
    pub filename: Option<String>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl MediaAttachment {
    pub fn new(mime_type: impl Into<String>, filename: Option<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            filename,
            data,
        }
    }

    /// File name if present, otherwise a generic label derived from the MIME type.
    pub fn display_name(&self) -> String {
        match self.filename.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => {
                let ext = self.mime_type.split('/').nth(1).unwrap_or("bin");
                format!("attachment.{ext}")
            }
        }
    }
}

/// Content of one outgoing WhatsApp message.
#[derive(Debug, Clone)]
pub enum OutgoingContent {
    Text(String),
    Image {
        media: MediaAttachment,
        caption: Option<String>,
    },
    Document {
        media: MediaAttachment,
        caption: Option<String>,
    },
}

impl OutgoingContent {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image { .. } => "image",
            Self::Document { .. } => "document",
        }
    }
}

/// Receipt returned by the WhatsApp client after a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Messaging-system-assigned message id.
    pub id: String,
}

/// Registration info for a number that has a WhatsApp account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberId {
    /// Canonical chat id as reported by WhatsApp.
    pub jid: String,
}

/// A conversation known to the WhatsApp client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
}

/// A message from the WhatsApp client's own history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub from_me: bool,
    /// Unix seconds.
    pub timestamp: i64,
    /// Delivery acknowledgment level (-1 error, 0 pending, 1 server, 2 device, 3 read).
    #[serde(default)]
    pub ack: i32,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub is_status: bool,
}

impl HistoricalMessage {
    pub fn is_revoked(&self) -> bool {
        self.kind == "revoked"
    }
}

/// A task due for a reminder, as returned by a task data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueTask {
    pub id: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(rename = "type", default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub list_title: Option<String>,
    #[serde(default)]
    pub project_title: Option<String>,
    #[serde(default)]
    pub assignee_name: Option<String>,
    #[serde(default)]
    pub assignee_phone: String,
}
