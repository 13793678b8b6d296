//! API client for the bookstore REST API.
//!
//! The server rotates credentials through `Set-Cookie` headers rather than the
//! response body. `ApiClient` plays the role of the browser here: it reads the
//! cookies off every response and writes the credential cookies into the
//! shared [`SessionStore`], and it sends them back on every request.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::refresh::TokenRenewer;
use crate::auth::SessionStore;
use crate::config::Config;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// Also bounds how long a renewal can stay in flight.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/auth/login";
const REFRESH_PATH: &str = "/auth/refresh-token";
const LOGOUT_PATH: &str = "/auth/logout";

/// Envelope every endpoint answers with
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Turn a `success: false` body into an error
    fn into_result(self) -> Result<Option<T>, ApiError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ApiError::Rejected(
                self.message.unwrap_or_else(|| "no reason given".to_string()),
            ))
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

/// Body of a renewal call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewRequest {
    pub refresh_token: String,
    pub username: String,
}

/// Renewal payload. Informational only: the credentials that matter arrive
/// as cookies.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<serde_json::Value>,
}

/// API client for the bookstore backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<SessionStore>,
}

impl ApiClient {
    /// Create a new API client writing cookies into `store`
    pub fn new(config: &Config, store: Arc<SessionStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            store,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Authenticate and record the identity. Credentials arrive as cookies.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginData, ApiError> {
        let body = LoginRequest { username, password };
        let data: Option<LoginData> = self.post(LOGIN_PATH, &body).await?;
        let data = data.unwrap_or_default();

        if self.store.session_token().is_none() {
            return Err(ApiError::InvalidResponse(
                "login succeeded but no session cookie was set".to_string(),
            ));
        }

        self.store.set_identity(username, data.user.clone());
        info!(username, "Logged in");
        Ok(data)
    }

    /// Exchange the refresh companion for a new session credential
    pub async fn refresh_token(&self, request: &RenewRequest) -> Result<TokenGrant, ApiError> {
        let grant: Option<TokenGrant> = self.post(REFRESH_PATH, request).await?;
        Ok(grant.unwrap_or_default())
    }

    /// End the session server side. Local state is cleared even if the call fails.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self
            .post::<serde_json::Value, _>(LOGOUT_PATH, &serde_json::json!({}))
            .await
            .map(|_| ());
        self.store.clear();
        result
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers())
            .json(body)
            .send()
            .await?;

        self.absorb_cookies(&response);

        let response = Self::check_response(response).await?;
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))?;
        envelope.into_result()
    }

    /// Bearer credential plus the cookie header a browser would send
    fn auth_headers(&self) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();

        if let Some(token) = self.store.session_token() {
            match header::HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(header::AUTHORIZATION, value);
                }
                Err(_) => warn!("Session credential is not a valid header value"),
            }
        }

        let cookie = self
            .store
            .cookies()
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        if !cookie.is_empty() {
            if let Ok(value) = header::HeaderValue::from_str(&cookie) {
                headers.insert(header::COOKIE, value);
            }
        }

        headers
    }

    /// Write credential cookies from `Set-Cookie` into the session store
    fn absorb_cookies(&self, response: &reqwest::Response) {
        let names = self.store.cookie_names();
        for cookie in response.cookies() {
            if !names.contains(&cookie.name()) {
                continue;
            }
            if cookie_is_removal(cookie.value(), cookie.max_age(), cookie.expires()) {
                debug!(name = cookie.name(), "Cookie removed by server");
                self.store.remove_cookie(cookie.name());
            } else {
                debug!(name = cookie.name(), "Cookie set by server");
                self.store.set_cookie(cookie.name(), cookie.value());
            }
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

/// A server deletes a cookie by blanking it or expiring it immediately
fn cookie_is_removal(value: &str, max_age: Option<Duration>, expires: Option<SystemTime>) -> bool {
    value.is_empty()
        || max_age.is_some_and(|age| age.is_zero())
        || expires.is_some_and(|at| at <= SystemTime::now())
}

#[async_trait]
impl TokenRenewer for ApiClient {
    async fn renew(&self, request: &RenewRequest) -> Result<(), ApiError> {
        let grant = self.refresh_token(request).await?;
        debug!(expires_in = ?grant.expires_in, "Renewal accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_is_removal() {
        assert!(cookie_is_removal("", None, None));
        assert!(cookie_is_removal("v", Some(Duration::ZERO), None));
        assert!(cookie_is_removal("v", None, Some(SystemTime::UNIX_EPOCH)));
        assert!(!cookie_is_removal("v", Some(Duration::from_secs(60)), None));
        assert!(!cookie_is_removal(
            "v",
            None,
            Some(SystemTime::now() + Duration::from_secs(3600))
        ));
    }

    #[test]
    fn test_renew_request_wire_format() {
        let request = RenewRequest {
            refresh_token: "r".to_string(),
            username: "alice".to_string(),
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json, serde_json::json!({"refreshToken": "r", "username": "alice"}));
    }

    #[test]
    fn test_envelope_rejection() {
        let body: ApiResponse<TokenGrant> =
            serde_json::from_str(r#"{"success": false, "message": "refresh token revoked"}"#)
                .expect("parse");
        assert!(matches!(body.into_result(), Err(ApiError::Rejected(m)) if m == "refresh token revoked"));

        let body: ApiResponse<TokenGrant> =
            serde_json::from_str(r#"{"success": true, "data": {"token": "t", "expiresIn": 900}}"#)
                .expect("parse");
        let grant = body.into_result().expect("ok").expect("data");
        assert_eq!(grant.token.as_deref(), Some("t"));
    }

    #[test]
    fn test_auth_headers_carry_credentials() {
        let store = Arc::new(SessionStore::in_memory(&Config::default()));
        store.set_cookie("token", "abc");
        store.set_cookie("refreshToken", "def");
        let client = ApiClient::new(&Config::default(), store).expect("client");

        let headers = client.auth_headers();
        assert_eq!(headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()), Some("Bearer abc"));
        assert_eq!(
            headers.get(header::COOKIE).and_then(|v| v.to_str().ok()),
            Some("refreshToken=def; token=abc")
        );
    }
}
