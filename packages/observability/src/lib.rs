//! # Observability
//!
//! Centralized logging layer for the ClassHopper client crates.
//!
//! Library crates only ever use `tracing` macros. Binaries call
//! [`init`] or [`init_with_config`] once at startup; this crate decides
//! where the records go:
//!
//! - structured JSONL appended to `~/.classhopper/logs/client.jsonl`
//! - optionally a compact human-readable stream on stderr
//!
//! Credentials travel through the session layer constantly (bearer tokens,
//! request signatures, the app secret), so the JSONL layer redacts any field
//! whose name marks it as secret before it reaches disk.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "classhopper".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!
//!     tracing::info!("client started");
//! }
//! ```

mod json_layer;
mod writer;

use std::path::PathBuf;

pub use json_layer::{is_secret_field, JsonLayer, LogEntry, REDACTED};
pub use writer::{default_log_path, CentralLogWriter, WriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "classhopper", "relay-probe").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.classhopper/logs/client.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,

    /// Replace secret-looking field values with a placeholder in the file output.
    pub redact_secrets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            redact_secrets: true,
        }
    }
}

/// Initialize the observability layer with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// A second call is a no-op: the first installed subscriber wins.
pub fn init_with_config(config: LogConfig) {
    writer::init_subscriber(&config);
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
        assert!(config.redact_secrets);
    }
}
