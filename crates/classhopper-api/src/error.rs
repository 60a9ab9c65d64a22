//! Error types for business API calls.

use thiserror::Error;
use token_auth::{AuthError, CredentialRejection};

#[derive(Debug, Error)]
pub enum ApiError {
    /// No credential could be obtained.
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// Network failure, timeout or TLS error.
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server refused the credential (HTTP 401).
    #[error("Credential expired")]
    CredentialExpired,

    /// Response did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Protocol(String),

    /// The server understood the request and said no.
    #[error("{0}")]
    Rejected(String),
}

impl CredentialRejection for ApiError {
    fn is_credential_expired(&self) -> bool {
        matches!(
            self,
            ApiError::CredentialExpired | ApiError::Auth(AuthError::CredentialExpired)
        )
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_detection() {
        assert!(ApiError::CredentialExpired.is_credential_expired());
        assert!(ApiError::from(AuthError::CredentialExpired).is_credential_expired());
        assert!(!ApiError::Rejected("no".into()).is_credential_expired());
        assert!(!ApiError::Auth(AuthError::MissingToken).is_credential_expired());
    }
}
