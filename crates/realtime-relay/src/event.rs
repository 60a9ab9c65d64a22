//! Connection state and the events delivered to the listener.

use crate::RelayError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// An opaque application frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub(crate) fn into_message(self) -> Message {
        match self {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Binary(bytes) => Message::Binary(bytes.into()),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

/// Events emitted by the connection supervisor, in order, over the
/// listener channel given to `connect`.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Transport opened.
    Opened,
    /// Frame received from the peer.
    Message(Payload),
    /// Peer sent a close frame. Always followed by `Closed` or `Failed`.
    Closing { code: u16, reason: String },
    /// Transport closed cleanly.
    Closed { code: u16, reason: String },
    /// Transport failed (handshake, I/O, keepalive).
    Failed { error: Arc<RelayError> },
    /// A reconnect will be attempted after `delay`.
    ReconnectScheduled { attempt: u32, delay: Duration },
}

/// Three-valued indicator suitable for a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Disconnected,
}

impl ConnectionStatus {
    /// Status implied by an event; `None` for events that do not change it.
    pub fn from_event(event: &ConnectionEvent) -> Option<Self> {
        match event {
            ConnectionEvent::Opened => Some(Self::Connected),
            ConnectionEvent::ReconnectScheduled { .. } => Some(Self::Connecting),
            ConnectionEvent::Closing { .. }
            | ConnectionEvent::Closed { .. }
            | ConnectionEvent::Failed { .. } => Some(Self::Disconnected),
            ConnectionEvent::Message(_) => None,
        }
    }
}

impl From<ConnectionState> for ConnectionStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Connected,
            ConnectionState::Connecting => Self::Connecting,
            ConnectionState::Disconnected => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connected => "connected",
            Self::Connecting => "connecting",
            Self::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}
