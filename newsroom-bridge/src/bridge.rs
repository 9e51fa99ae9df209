//! Transport seam and connection state
//!
//! The connection manager talks to the backend through [`Connector`] and
//! [`WireSession`] so the reconnect loop can run against the real WebSocket
//! transport ([`crate::ws::WsConnector`]) or a scripted one in tests.

use crate::error::BridgeResult;
use async_trait::async_trait;
use std::fmt;

/// Connection state as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected and no attempt pending
    #[default]
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Session open
    Connected,
    /// Last attempt or session failed; a retry may be scheduled
    Error(String),
    /// Retries exhausted; only a manual reconnect will try again
    GaveUp,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn needs_manual_reconnect(&self) -> bool {
        matches!(self, ConnectionStatus::GaveUp)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "live",
            ConnectionStatus::Error(_) => "reconnecting",
            ConnectionStatus::GaveUp => "offline",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Error(reason) => write!(f, "error: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Opens sessions to the broadcast backend
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> BridgeResult<Box<dyn WireSession>>;
}

/// One open session
#[async_trait]
pub trait WireSession: Send {
    /// Next text frame; `None` once the peer closed the session
    async fn recv(&mut self) -> Option<BridgeResult<String>>;

    async fn send(&mut self, text: String) -> BridgeResult<()>;

    async fn close(&mut self);
}
