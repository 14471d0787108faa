use thiserror::Error;

/// Top-level error type for wa-relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The WhatsApp session is not ready to send.
    #[error("whatsapp client not connected")]
    NotConnected,

    /// Missing or malformed request fields.
    #[error("validation error: {0}")]
    Validation(String),

    /// The number has no WhatsApp account.
    #[error("recipient not on whatsapp: {0}")]
    RecipientUnregistered(String),

    /// Transport-level failure reported by the WhatsApp client.
    #[error("send failed: {0}")]
    Send(String),

    /// Template API returned a non-success status or empty text.
    #[error("template render failed: {0}")]
    Render(String),

    /// Send-log persistence error.
    #[error("store error: {0}")]
    Store(String),

    /// Task data source error.
    #[error("task source error: {0}")]
    Source(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    /// Short machine-readable kind, used in API responses and batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::Validation(_) => "validation_error",
            Self::RecipientUnregistered(_) => "not_on_whatsapp",
            Self::Send(_) => "send_failure",
            Self::Render(_) => "upstream_render_failure",
            Self::Store(_) => "store_io_failure",
            Self::Source(_) => "source_failure",
            Self::Config(_) => "configuration_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}
