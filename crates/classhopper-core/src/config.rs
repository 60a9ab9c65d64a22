//! Client configuration.
//!
//! Defaults carry the production endpoints; every value can be overridden
//! through a `CLASSHOPPER_*` environment variable.

use crate::{CoreError, CoreResult};
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Credential acquisition settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Token issuing endpoint.
    pub auth_url: String,
    /// Application key sent with (and signed into) every acquisition.
    pub app_key: String,
    /// Shared HMAC secret. Never logged.
    pub app_secret: String,
    /// Lifetime assumed when the server's expiry cannot be parsed.
    pub fallback_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://101.42.43.228/api/user/third-auth".to_string(),
            app_key: "buaa-classhopper-android".to_string(),
            app_secret: String::new(),
            fallback_ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// Business endpoint settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub login_url: String,
    pub schedule_url: String,
    pub sign_url: String,
    /// Upper bound for a whole HTTP exchange.
    pub request_timeout: Duration,
    /// Upper bound for establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            login_url: "https://iclass.buaa.edu.cn:8346/app/user/login.action".to_string(),
            schedule_url: "https://iclass.buaa.edu.cn:8346/app/course/get_stu_course_sched.action"
                .to_string(),
            sign_url: "http://iclass.buaa.edu.cn:8081/app/course/stu_scan_sign.action".to_string(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Realtime channel settings.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket endpoint; the token is appended as a query parameter.
    pub url: String,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Timeout for a single frame write.
    pub write_timeout: Duration,
    /// Silence tolerated past a keepalive ping before the link is declared dead.
    pub read_timeout: Duration,
    /// Keepalive ping period. `None` disables keepalive.
    pub ping_interval: Option<Duration>,
    /// First reconnect delay; doubles per attempt.
    pub reconnect_base_delay: Duration,
    /// Reconnect delay cap.
    pub reconnect_max_delay: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "wss://101.42.43.228/chat".to_string(),
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            ping_interval: Some(Duration::from_secs(10)),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub auth: AuthConfig,
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    /// Skip TLS certificate validation. Debug builds against test servers only.
    pub insecure_tls: bool,
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_millis(name: &str) -> Option<Duration> {
    env_string(name)
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn env_flag(name: &str) -> Option<bool> {
    env_string(name).map(|value| matches!(value.as_str(), "1" | "true" | "yes" | "on"))
}

impl Config {
    /// Defaults overlaid with `CLASSHOPPER_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_string("CLASSHOPPER_AUTH_URL") {
            config.auth.auth_url = v;
        }
        if let Some(v) = env_string("CLASSHOPPER_APP_KEY") {
            config.auth.app_key = v;
        }
        if let Some(v) = env_string("CLASSHOPPER_APP_SECRET") {
            config.auth.app_secret = v;
        }
        if let Some(v) = env_millis("CLASSHOPPER_TOKEN_FALLBACK_TTL_MS") {
            config.auth.fallback_ttl = v;
        }

        if let Some(v) = env_string("CLASSHOPPER_LOGIN_URL") {
            config.api.login_url = v;
        }
        if let Some(v) = env_string("CLASSHOPPER_SCHEDULE_URL") {
            config.api.schedule_url = v;
        }
        if let Some(v) = env_string("CLASSHOPPER_SIGN_URL") {
            config.api.sign_url = v;
        }
        if let Some(v) = env_millis("CLASSHOPPER_HTTP_TIMEOUT_MS") {
            config.api.request_timeout = v;
        }

        if let Some(v) = env_string("CLASSHOPPER_REALTIME_URL") {
            config.realtime.url = v;
        }
        if let Some(v) = env_millis("CLASSHOPPER_WS_TIMEOUT_MS") {
            config.realtime.connect_timeout = v;
            config.realtime.write_timeout = v;
            config.realtime.read_timeout = v;
        }
        if let Some(v) = env_millis("CLASSHOPPER_WS_PING_MS") {
            config.realtime.ping_interval = (!v.is_zero()).then_some(v);
        }

        if let Some(v) = env_flag("CLASSHOPPER_INSECURE_TLS") {
            config.insecure_tls = v;
        }

        config
    }

    /// Reject configurations that cannot possibly work.
    pub fn validate(&self) -> CoreResult<()> {
        if self.auth.app_secret.is_empty() {
            return Err(CoreError::Config(
                "app secret is empty (set CLASSHOPPER_APP_SECRET)".to_string(),
            ));
        }
        if self.auth.app_key.is_empty() {
            return Err(CoreError::Config("app key is empty".to_string()));
        }

        let urls = [
            ("auth_url", &self.auth.auth_url),
            ("login_url", &self.api.login_url),
            ("schedule_url", &self.api.schedule_url),
            ("sign_url", &self.api.sign_url),
            ("realtime_url", &self.realtime.url),
        ];
        for (field, value) in urls {
            Url::parse(value).map_err(|source| CoreError::InvalidUrl { field, source })?;
        }

        if self.realtime.reconnect_base_delay.is_zero() {
            return Err(CoreError::Config(
                "reconnect base delay must be positive".to_string(),
            ));
        }

        if self.insecure_tls {
            warn!("TLS certificate validation is DISABLED; never use this against production");
        }

        Ok(())
    }
}
