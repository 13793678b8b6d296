//! REST transport for the bookstore API.
//!
//! This module provides the `ApiClient` for the authentication endpoints
//! (login, renewal, logout). The server hands out credentials as cookies;
//! the client mirrors them into the shared `SessionStore`.

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiResponse, LoginData, RenewRequest, TokenGrant};
pub use error::ApiError;
