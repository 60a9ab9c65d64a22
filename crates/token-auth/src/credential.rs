//! Bearer credential and expiry parsing.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::time::Duration;

/// A bearer token and the instant it stops being valid.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Valid iff now is strictly before the expiry instant.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && now < self.expires_at
    }

    /// Value for an `Authorization: Bearer` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

// Tokens must not leak through `{:?}` in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Parse the server's expiry timestamp.
///
/// Accepts RFC 3339 (`2024-05-01T10:00:00.000Z`, `...+08:00`) and naive ISO
/// 8601 without an offset, which is taken as UTC. Returns `None` when the
/// value is absent or unparsable.
pub fn parse_expiry(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = raw.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|dt| dt.and_utc())
}

/// Expiry from the server value, or `now + fallback_ttl` when it cannot be read.
pub(crate) fn expiry_or_fallback(
    raw: Option<&str>,
    now: DateTime<Utc>,
    fallback_ttl: Duration,
) -> DateTime<Utc> {
    parse_expiry(raw).unwrap_or_else(|| {
        let ttl = chrono::Duration::from_std(fallback_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(2));
        now + ttl
    })
}
