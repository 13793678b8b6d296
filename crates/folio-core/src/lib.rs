//! Core library for folio, the bookstore client.
//!
//! Holds everything a front-end needs to keep a user signed in: the session
//! store, the API transport, and the refresh manager that renews the session
//! credential before it expires.

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError};
pub use auth::{Navigator, RefreshManager, SessionStore, SessionTerminator};
pub use config::Config;
