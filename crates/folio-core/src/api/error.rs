//! Failures reported by the bookstore auth endpoints.
//!
//! Every sign-in, renewal and sign-out call resolves to one of these. The
//! refresh manager treats any of them as a failed renewal and ends the
//! session, so the variants mostly matter for what the user is told.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// 403 from an auth endpoint, e.g. a suspended account
    #[error("Account not permitted: {0}")]
    AccessDenied(String),

    /// 401: the session or refresh credential was not accepted
    #[error("Session credential not accepted, sign in again")]
    Unauthorized,

    /// 404: usually a wrong `api_base_url`
    #[error("Auth endpoint not found: {0}")]
    NotFound(String),

    #[error("Too many sign-in or renewal attempts, wait before retrying")]
    RateLimited,

    #[error("Bookstore server error: {0}")]
    ServerError(String),

    /// The request never produced a response (DNS, refused, timed out)
    #[error("Could not reach the bookstore: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Unexpected status or a body that is not the `{ success, message, data }` envelope
    #[error("Unexpected auth response: {0}")]
    InvalidResponse(String),

    /// Envelope with `success: false`, e.g. bad password or revoked refresh credential
    #[error("Rejected by server: {0}")]
    Rejected(String),
}

/// Server bodies longer than this are cut before they reach logs
const MAX_ERROR_BODY_BYTES: usize = 500;

impl ApiError {
    /// Cut `body` on a char boundary at or below the limit
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_BYTES {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_BYTES;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Classify a non-2xx reply from an auth endpoint
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(body),
            404 => ApiError::NotFound(body),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(body),
            _ => ApiError::InvalidResponse(format!("status {}: {}", status, body)),
        }
    }
}
