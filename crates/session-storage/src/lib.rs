//! Local storage for the ClassHopper session layer.
//!
//! This crate provides:
//! - the [`SecureStorage`] key/value abstraction
//! - a file-backed store (owner-only permissions on unix) and an in-memory store
//! - the persistent device identity signed into every credential request

mod file;
mod identity;
mod keys;
mod memory;
mod traits;

pub use file::FileStorage;
pub use identity::DeviceIdentity;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use classhopper_core::Paths;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default file-backed store under the application directory.
pub fn create_storage(paths: &Paths) -> StorageResult<Box<dyn SecureStorage>> {
    let storage = FileStorage::open(paths.store_file())?;
    Ok(Box::new(storage))
}
