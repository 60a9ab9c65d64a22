//! Credential cache with coalesced refresh and retry-once.

use crate::credential::expiry_or_fallback;
use crate::{AuthError, AuthResult, Credential, CredentialRejection};
use chrono::Utc;
use classhopper_core::{AuthConfig, Config};
use request_signer::SignedParams;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Credential request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    app_key: &'a str,
    timestamp: i64,
    signature: &'a str,
    #[serde(rename = "appUUID")]
    app_uuid: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    code: i64,
    #[serde(default, alias = "message")]
    msg: Option<String>,
    #[serde(default)]
    data: Option<AuthData>,
}

#[derive(Debug, Deserialize)]
struct AuthData {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "expireAt", alias = "expiresAt")]
    expire_at: Option<String>,
}

/// Owns the process's bearer credential.
///
/// The cache lock is held for the whole acquisition, so callers that find
/// no valid credential queue behind a single in-flight request and then
/// observe its result.
pub struct TokenManager {
    config: AuthConfig,
    device_id: String,
    http: Client,
    cached: Mutex<Option<Credential>>,
}

impl TokenManager {
    pub fn new(config: AuthConfig, device_id: impl Into<String>, http: Client) -> Self {
        Self {
            config,
            device_id: device_id.into(),
            http,
            cached: Mutex::new(None),
        }
    }

    /// Build a manager with its own HTTP client, honouring the configured
    /// timeouts and TLS mode.
    pub fn from_config(config: &Config, device_id: impl Into<String>) -> AuthResult<Self> {
        if config.auth.app_secret.is_empty() {
            return Err(AuthError::Config("app secret is empty".to_string()));
        }

        let http = Client::builder()
            .timeout(config.api.request_timeout)
            .connect_timeout(config.api.connect_timeout)
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()?;

        Ok(Self::new(config.auth.clone(), device_id, http))
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Return a valid credential, acquiring a new one if the cache is empty
    /// or expired.
    pub async fn get_valid_token(&self) -> AuthResult<Credential> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref().filter(|c| c.is_valid()) {
            debug!(expires_at = %credential.expires_at, "Using cached credential");
            return Ok(credential.clone());
        }

        let credential = self.acquire().await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Drop the cached credential if it is still `rejected_token`.
    ///
    /// A credential refreshed concurrently by another caller is kept.
    pub async fn invalidate(&self, rejected_token: &str) {
        let mut cached = self.cached.lock().await;
        if cached.as_ref().is_some_and(|c| c.token == rejected_token) {
            debug!("Invalidating rejected credential");
            *cached = None;
        }
    }

    /// Forget any cached credential.
    pub async fn clear(&self) {
        self.cached.lock().await.take();
    }

    /// Snapshot of the cache, without refreshing.
    pub async fn cached(&self) -> Option<Credential> {
        self.cached.lock().await.clone()
    }

    /// Run `action` with a valid credential, refreshing and retrying exactly
    /// once if it reports the credential as expired.
    ///
    /// The second attempt's result is returned as-is.
    pub async fn with_valid_token<T, E, F, Fut>(&self, mut action: F) -> Result<T, E>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AuthError> + CredentialRejection,
    {
        let credential = self.get_valid_token().await?;
        let rejected = credential.token.clone();

        match action(credential).await {
            Err(e) if e.is_credential_expired() => {
                warn!("Credential rejected, refreshing and retrying once");
                self.invalidate(&rejected).await;
                let fresh = self.get_valid_token().await?;
                action(fresh).await
            }
            other => other,
        }
    }

    async fn acquire(&self) -> AuthResult<Credential> {
        let now = Utc::now();
        let timestamp = now.timestamp_millis();

        let signed = SignedParams::new()
            .insert("appKey", self.config.app_key.as_str())
            .insert("timestamp", timestamp.to_string())
            .insert("appUUID", self.device_id.as_str())
            .sign(&self.config.app_secret);

        let body = AuthRequest {
            app_key: &self.config.app_key,
            timestamp,
            signature: signed.signature(),
            app_uuid: &self.device_id,
        };

        debug!(url = %self.config.auth_url, timestamp, "Requesting credential");

        let response = self
            .http
            .post(&self.config.auth_url)
            .json(&body)
            .send()
            .await
            .inspect_err(|e| warn!(error = %e, "Credential request failed"))?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Auth endpoint returned error status");
            return Err(AuthError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: AuthResponse = serde_json::from_str(&text)?;
        if parsed.code != 1 {
            let message = parsed.msg.unwrap_or_default();
            warn!(code = parsed.code, message = %message, "Credential request rejected");
            return Err(AuthError::Rejected {
                code: parsed.code,
                message,
            });
        }

        let data = parsed.data.ok_or(AuthError::MissingToken)?;
        let token = data
            .token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let expires_at =
            expiry_or_fallback(data.expire_at.as_deref(), Utc::now(), self.config.fallback_ttl);

        info!(expires_at = %expires_at, "Acquired credential");
        Ok(Credential { token, expires_at })
    }
}
