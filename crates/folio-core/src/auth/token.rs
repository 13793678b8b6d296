//! Session credential inspection.
//!
//! Decodes the claims embedded in a bearer credential so the client can reason
//! about its expiry. This is an informational decode only: the signature is
//! never checked here. The server is the only party that verifies credentials,
//! and nothing in this module should be used to make a trust decision.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Claims carried in the middle segment of a session credential.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Expiry instant, seconds since the Unix epoch. Fractional values are
    /// truncated to whole seconds.
    #[serde(deserialize_with = "numeric_date")]
    pub exp: i64,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Claims {
    /// Expiry instant in milliseconds since the Unix epoch
    pub fn expiry_millis(&self) -> i64 {
        self.exp.saturating_mul(1000)
    }

    /// Subject identifier, falling back to the `username` claim
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref().or(self.username.as_deref())
    }
}

/// NumericDate may be an integer or a float; floats saturate into `i64`
fn numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let number = serde_json::Number::deserialize(deserializer)?;
    match number.as_i64() {
        Some(secs) => Ok(secs),
        None => number
            .as_f64()
            .map(|secs| secs.trunc() as i64)
            .ok_or_else(|| serde::de::Error::custom("exp is not a number")),
    }
}

/// Decode the claims of a three-segment credential.
///
/// Returns `None` for anything malformed (wrong segment count, bad base64,
/// non-JSON payload, missing `exp`). Callers treat `None` as "expiry unknown".
pub fn decode_claims(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => return None,
    };

    // Tolerate the standard alphabet and trailing padding some issuers emit
    let normalized: String = payload
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let bytes = URL_SAFE_NO_PAD.decode(normalized.as_bytes()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Expiry instant of the credential in milliseconds, if it can be determined
pub fn expiry_millis(token: &str) -> Option<i64> {
    decode_claims(token).map(|claims| claims.expiry_millis())
}

/// Time left before the credential expires, floored at zero.
///
/// Malformed credentials have no time remaining.
pub fn time_remaining_at(token: &str, now: DateTime<Utc>) -> Duration {
    match expiry_millis(token) {
        Some(exp_ms) => {
            let remaining = exp_ms.saturating_sub(now.timestamp_millis());
            Duration::from_millis(u64::try_from(remaining).unwrap_or(0))
        }
        None => Duration::ZERO,
    }
}

/// True when the credential has no time left or its expiry is unknown
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    time_remaining_at(token, now).is_zero()
}

/// True when the credential is still valid but expires within `window`.
///
/// An already expired credential is not "expiring soon", it is expired.
pub fn is_expiring_soon_at(token: &str, window: Duration, now: DateTime<Utc>) -> bool {
    let remaining = time_remaining_at(token, now);
    !remaining.is_zero() && remaining <= window
}

pub fn time_remaining(token: &str) -> Duration {
    time_remaining_at(token, Utc::now())
}

pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

pub fn is_expiring_soon(token: &str, window: Duration) -> bool {
    is_expiring_soon_at(token, window, Utc::now())
}

/// Build an unsigned credential carrying the given claims. Test support only.
#[cfg(test)]
pub(crate) fn forge(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.signature", header, payload)
}
