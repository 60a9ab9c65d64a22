//! Credential management for the ClassHopper backend.
//!
//! [`TokenManager`] acquires short-lived bearer credentials from the auth
//! endpoint with a signed request, caches them until expiry, coalesces
//! concurrent refreshes, and retries a rejected call exactly once through
//! [`TokenManager::with_valid_token`].

mod credential;
mod error;
mod manager;

pub use credential::{parse_expiry, Credential};
pub use error::{AuthError, AuthResult, CredentialRejection};
pub use manager::TokenManager;
