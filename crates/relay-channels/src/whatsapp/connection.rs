//! Session state machine.
//!
//! The bridge reports connection events; the manager folds them into a single
//! [`ConnectionStatus`] value. Readers get a snapshot via [`ConnectionManager::status`]
//! or follow transitions with [`ConnectionManager::subscribe`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use super::qr::generate_qr_terminal;

/// Transition buffer per subscriber. Slow subscribers skip ahead (lagged).
const TRANSITION_BUFFER: usize = 32;

/// Lifecycle of the WhatsApp session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Initializing,
    QrPending,
    Authenticated,
    Ready,
    AuthFailure,
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::QrPending => "qr_pending",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
            Self::AuthFailure => "auth_failure",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Event pushed by the bridge, e.g. `{"event":"qr","data":"2@abc..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ConnectionEvent {
    Qr(String),
    Authenticated,
    Ready,
    AuthFailure(String),
    Disconnected(String),
    /// Raw client state string (`CONNECTED`, `UNPAIRED`, ...).
    ChangeState(String),
}

/// Snapshot of the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Last QR payload while pairing is pending.
    pub last_qr: Option<String>,
    /// Last raw state reported by the client.
    pub raw_state: Option<String>,
    /// Reason attached to the last failure/disconnect.
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl ConnectionStatus {
    fn initial() -> Self {
        Self {
            state: ConnectionState::Initializing,
            last_qr: None,
            raw_state: None,
            reason: None,
            changed_at: Utc::now(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Fold one event into the status.
    fn apply(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Qr(code) => {
                self.state = ConnectionState::QrPending;
                self.last_qr = Some(code.clone());
            }
            ConnectionEvent::Authenticated => {
                self.state = ConnectionState::Authenticated;
                self.last_qr = None;
                self.reason = None;
            }
            ConnectionEvent::Ready => {
                self.state = ConnectionState::Ready;
                self.last_qr = None;
                self.reason = None;
            }
            ConnectionEvent::AuthFailure(reason) => {
                self.state = ConnectionState::AuthFailure;
                self.reason = Some(reason.clone());
            }
            ConnectionEvent::Disconnected(reason) => {
                self.state = ConnectionState::Disconnected;
                self.reason = Some(reason.clone());
            }
            ConnectionEvent::ChangeState(raw) => {
                self.raw_state = Some(raw.clone());
                match raw.as_str() {
                    "CONNECTED" => {
                        self.state = ConnectionState::Ready;
                        self.reason = None;
                    }
                    "UNPAIRED" | "UNPAIRED_IDLE" | "CONFLICT" => {
                        self.state = ConnectionState::Disconnected;
                        self.reason = Some(raw.clone());
                    }
                    _ => {}
                }
            }
        }
        self.changed_at = Utc::now();
    }
}

/// Owns the session state. Cheap to share behind an `Arc`.
pub struct ConnectionManager {
    state: watch::Sender<ConnectionStatus>,
    transitions: broadcast::Sender<ConnectionStatus>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionStatus::initial());
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self { state, transitions }
    }

    /// Apply an event and broadcast the resulting status.
    pub fn apply(&self, event: ConnectionEvent) -> ConnectionStatus {
        self.state.send_modify(|status| status.apply(&event));
        let status = self.status();

        match &event {
            ConnectionEvent::Qr(code) => {
                info!("WhatsApp pairing required, scan the QR code");
                match generate_qr_terminal(code) {
                    Ok(qr) => println!("\n{qr}"),
                    Err(e) => warn!("failed to render QR code: {e}"),
                }
            }
            ConnectionEvent::AuthFailure(reason) => warn!("WhatsApp auth failure: {reason}"),
            ConnectionEvent::Disconnected(reason) => warn!("WhatsApp disconnected: {reason}"),
            _ => info!("WhatsApp state: {}", status.state.as_str()),
        }

        // No subscribers is fine.
        let _ = self.transitions.send(status.clone());
        status
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// Follow transitions in emission order.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.transitions.subscribe()
    }

    /// Watch the latest status only.
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.state.subscribe()
    }
}
