//! Realtime channel for the ClassHopper client.
//!
//! This crate provides:
//! - a supervised WebSocket connection with exponential-backoff reconnect
//! - ordered connection events over a single listener channel
//! - keepalive pings with dead-peer detection
//! - a `Connector` seam so the transport can be swapped in tests

mod backoff;
mod connector;
mod endpoint;
mod error;
mod event;
mod supervisor;

pub use backoff::BackoffPolicy;
pub use connector::{Connector, FrameSink, FrameStream, Transport, WebSocketConnector};
pub use endpoint::realtime_url;
pub use error::{RelayError, RelayResult};
pub use event::{ConnectionEvent, ConnectionState, ConnectionStatus, Payload};
pub use supervisor::{ConnectionSupervisor, EventSender};
