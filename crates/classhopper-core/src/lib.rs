//! Core types, configuration, and utilities for the ClassHopper client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{ApiConfig, AuthConfig, Config, RealtimeConfig};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service};
pub use paths::Paths;
