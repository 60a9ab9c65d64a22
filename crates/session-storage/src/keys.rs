//! Storage key constants.

/// Storage keys used by the session layer
pub struct StorageKeys;

impl StorageKeys {
    /// Stable per-installation device identifier (UUID v4)
    pub const DEVICE_ID: &'static str = "device_id";
}
