//! WhatsApp client backed by a WhatsApp Web bridge sidecar.
//!
//! The bridge owns the browser session (QR pairing, auth, persistence) and
//! exposes a small HTTP API. Connection events flow the other way: the bridge
//! posts them to the relay, which feeds them into the [`ConnectionManager`].

mod client;
mod connection;
mod qr;

#[cfg(test)]
mod tests;

pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStatus};
pub use qr::{generate_qr_image, generate_qr_terminal, qr_png_base64};

use relay_core::{config::WhatsAppConfig, error::RelayError};
use std::sync::Arc;
use std::time::Duration;

/// WhatsApp client speaking to the bridge over HTTP.
pub struct WhatsAppBridge {
    pub(super) http: reqwest::Client,
    pub(super) base_url: String,
    pub(super) token: Option<String>,
    pub(super) connection: Arc<ConnectionManager>,
}

impl WhatsAppBridge {
    /// Create a bridge client from config, sharing the given connection state.
    pub fn new(
        config: &WhatsAppConfig,
        connection: Arc<ConnectionManager>,
    ) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build bridge http client: {e}")))?;

        let token = if config.bridge_token.is_empty() {
            None
        } else {
            Some(config.bridge_token.clone())
        };

        Ok(Self {
            http,
            base_url: config.bridge_url.trim_end_matches('/').to_string(),
            token,
            connection,
        })
    }

    /// Shared connection state.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }
}
