//! # relay-channels
//!
//! Outbound integrations for wa-relay: the WhatsApp bridge client with its
//! connection state machine, and the remote template renderer.

pub mod templates;
pub mod whatsapp;

pub use templates::TemplateClient;
pub use whatsapp::{ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStatus, WhatsAppBridge};
