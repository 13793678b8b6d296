//! Session management for the bookstore client.
//!
//! This module provides:
//! - `token`: claim decoding and expiry queries for the session credential
//! - `SessionStore`: the cookie jar and identity cache shared with the transport
//! - `RefreshManager`: proactive renewal ahead of expiry
//! - `SessionTerminator`: sign-out and redirect when renewal fails
//! - `PasswordVault`: remembered passwords in the OS keychain

pub mod credentials;
pub mod failure;
pub mod refresh;
pub mod session;
pub mod token;

pub use credentials::PasswordVault;
pub use failure::{Navigator, SessionTerminator};
pub use refresh::{Clock, MonitorState, RefreshManager, RenewError, RenewOutcome, SystemClock, TokenRenewer};
pub use session::{SessionData, SessionStore};
