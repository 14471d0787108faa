use serde::{Deserialize, Serialize};

use super::defaults::*;

/// WhatsApp bridge config.
///
/// The relay talks to a WhatsApp Web bridge sidecar that owns the session
/// (QR pairing, auth, persistence). The bridge pushes connection events to
/// `POST /api/whatsapp/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Base URL of the bridge (e.g. `http://127.0.0.1:3001`).
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    /// Bearer token sent to the bridge. Empty = no auth.
    #[serde(default)]
    pub bridge_token: String,
    /// Country code applied to local numbers (e.g. `"212"`). Empty = none.
    #[serde(default)]
    pub default_country_code: String,
    /// Chat id domain suffix.
    #[serde(default = "default_jid_suffix")]
    pub jid_suffix: String,
    /// HTTP timeout for bridge requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            bridge_token: String::new(),
            default_country_code: String::new(),
            jid_suffix: default_jid_suffix(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Remote template-rendering API config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Base URL of the template API. Empty = templated sends disabled.
    #[serde(default)]
    pub base_url: String,
    /// Shared secret. Empty = header not sent.
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_secret_header")]
    pub secret_header: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            secret: String::new(),
            secret_header: default_secret_header(),
        }
    }
}
