//! Logging initialization for the client binaries.
//!
//! Thin wrappers over the observability crate so every binary logs with the
//! same layout: structured JSONL under `~/.classhopper/logs/client.jsonl`,
//! `RUST_LOG` overriding the default level, secrets redacted.

/// Initialize logging for the main client binary.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("client started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service("classhopper", level);
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: crate::Paths::new().ok().map(|paths| paths.log_file()),
        also_stderr: true,
        ..Default::default()
    });
}
