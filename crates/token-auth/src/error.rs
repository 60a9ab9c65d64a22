//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Network or protocol failure talking to the auth endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Auth endpoint answered with a non-success status
    #[error("Auth endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Auth endpoint refused to issue a credential
    #[error("Credential request rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// Success response without a usable token
    #[error("Auth response carried no token")]
    MissingToken,

    /// Response body was not the expected JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The credential was refused by a downstream service
    #[error("Credential expired")]
    CredentialExpired,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if the acquisition might succeed if simply tried again.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|s| s.is_server_error())
            }
            AuthError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can signal "the credential was not accepted".
///
/// [`TokenManager::with_valid_token`](crate::TokenManager::with_valid_token)
/// refreshes and retries once when the action fails with such an error.
pub trait CredentialRejection {
    fn is_credential_expired(&self) -> bool;
}

impl CredentialRejection for AuthError {
    fn is_credential_expired(&self) -> bool {
        matches!(self, AuthError::CredentialExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_status_is_transient() {
        let err = AuthError::Status {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_rejection_is_not_transient() {
        let err = AuthError::Rejected {
            code: 0,
            message: "bad signature".to_string(),
        };
        assert!(!err.is_transient());
        assert!(!AuthError::MissingToken.is_transient());
    }

    #[test]
    fn test_only_expired_is_rejection() {
        assert!(AuthError::CredentialExpired.is_credential_expired());
        assert!(!AuthError::MissingToken.is_credential_expired());
    }
}
