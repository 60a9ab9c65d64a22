//! Relay error types.

use thiserror::Error;

/// Relay error type.
///
/// These never cross the supervisor's public API as `Err`; they are carried
/// inside [`ConnectionEvent::Failed`](crate::ConnectionEvent::Failed).
#[derive(Error, Debug)]
pub enum RelayError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Invalid endpoint URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error
    #[error("TLS error: {0}")]
    Tls(String),

    /// No Tokio runtime to drive the connection
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;
