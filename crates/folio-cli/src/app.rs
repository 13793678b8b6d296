//! Application wiring for the folio terminal client.
//!
//! Builds the session store, transport and refresh manager once and exposes
//! the user-facing commands on top of them.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use folio_core::auth::token;
use folio_core::auth::{MonitorState, PasswordVault, RefreshManager, SessionStore, SessionTerminator};
use folio_core::{ApiClient, Config, Navigator};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::navigator::TerminalNavigator;

// ============================================================================
// Constants
// ============================================================================

/// How often `watch` re-checks the armed timer against the wall clock.
/// Catches timers delayed by suspend well before the threshold runs out.
const RECHECK_INTERVAL_SECS: u64 = 30;

/// Environment override for the sign-in username
const ENV_USERNAME: &str = "FOLIO_USERNAME";

/// Environment override for the sign-in password
const ENV_PASSWORD: &str = "FOLIO_PASSWORD";

pub struct App {
    config: Config,
    store: Arc<SessionStore>,
    api: ApiClient,
    navigator: Arc<TerminalNavigator>,
    manager: Arc<RefreshManager>,
}

impl App {
    /// Wire up the client with the user positioned at `route`
    pub fn new(config: Config, route: &str) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        debug!(?cache_dir, "Cache directory configured");

        let store = Arc::new(SessionStore::open(&cache_dir, &config)?);
        let api = ApiClient::new(&config, store.clone())?;
        let navigator = Arc::new(TerminalNavigator::new(route));

        let terminator = SessionTerminator::new(&config, store.clone(), navigator.clone());
        let manager = Arc::new(RefreshManager::new(
            &config,
            store.clone(),
            Arc::new(api.clone()),
            terminator,
        ));

        Ok(Self {
            config,
            store,
            api,
            navigator,
            manager,
        })
    }

    /// Sign in, then renew right away if the fresh credential is already short-lived
    pub async fn login(&mut self, username: Option<String>, remember: bool) -> Result<()> {
        let username = match username
            .or_else(|| std::env::var(ENV_USERNAME).ok())
            .or_else(|| self.config.last_username.clone())
        {
            Some(u) if !u.trim().is_empty() => u.trim().to_string(),
            _ => Self::prompt_username()?,
        };

        let password = match std::env::var(ENV_PASSWORD) {
            Ok(p) if !p.is_empty() => p,
            _ => match PasswordVault::recall(&username) {
                Ok(Some(p)) => {
                    info!("Using remembered password");
                    p
                }
                Ok(None) => Self::prompt_password()?,
                Err(e) => {
                    warn!(error = %e, "Keychain unavailable");
                    Self::prompt_password()?
                }
            },
        };

        println!("Signing in as {}...", username);
        self.api
            .login(&username, &password)
            .await
            .context("Sign-in failed")?;

        if remember {
            if let Err(e) = PasswordVault::remember(&username, &password) {
                warn!(error = %e, "Failed to store credentials");
            }
        }

        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        if self.manager.refresh_now().await {
            info!("Fresh credential was close to expiry, renewed");
        }

        println!("Signed in.");
        Ok(())
    }

    pub async fn logout(&self, forget: bool) -> Result<()> {
        let username = self.store.username();
        self.manager.stop_monitoring();

        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "Server logout failed, local session cleared anyway");
        }

        if forget {
            if let Some(ref username) = username {
                PasswordVault::forget(username)?;
            }
        }

        println!("Signed out.");
        Ok(())
    }

    pub fn status(&self) {
        let Some(credential) = self.store.session_token() else {
            println!("Not signed in.");
            return;
        };

        let username = self.store.username().unwrap_or_else(|| "(unknown)".to_string());
        println!("User:       {}", username);

        let Some(claims) = token::decode_claims(&credential) else {
            println!("Credential: unreadable, expiry unknown");
            return;
        };

        if let Some(role) = claims.role.as_deref() {
            println!("Role:       {}", role);
        }
        if let Some(expires) = DateTime::<Utc>::from_timestamp(claims.exp, 0) {
            println!("Expires:    {}", expires.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"));
        }

        let remaining = token::time_remaining(&credential);
        let state = if token::is_expired(&credential) {
            "expired"
        } else if token::is_expiring_soon(&credential, self.manager.threshold()) {
            "expiring soon"
        } else {
            "valid"
        };
        println!("Remaining:  {} ({})", format_remaining(remaining), state);
    }

    /// Renew now if inside the threshold
    pub async fn refresh(&self) -> Result<()> {
        if !self.store.has_session() {
            anyhow::bail!("Not signed in");
        }

        if self.manager.refresh_now().await {
            if self.store.has_session() {
                println!("Session renewed.");
            } else {
                println!("Renewal failed, signed out.");
            }
        } else {
            println!(
                "No renewal needed ({} left).",
                format_remaining(
                    self.store
                        .session_token()
                        .map(|t| token::time_remaining(&t))
                        .unwrap_or_default()
                )
            );
        }
        Ok(())
    }

    /// Keep the session alive until interrupted or until it ends
    pub async fn watch(&self) -> Result<()> {
        if !self.store.has_session() {
            anyhow::bail!("Not signed in");
        }

        self.manager.start_monitoring().await;
        self.report_monitor();

        let mut tick = tokio::time::interval(Duration::from_secs(RECHECK_INTERVAL_SECS));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                target = self.navigator.redirected() => {
                    println!("Session ended, redirected to {}.", target);
                    break;
                }
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl-C")?;
                    println!();
                    break;
                }
                _ = tick.tick() => {
                    self.manager.recheck().await;
                    if self.manager.state() == MonitorState::Idle {
                        if self.store.has_session() {
                            println!("Monitoring stopped: credential can no longer be renewed.");
                        } else {
                            println!("Session ended.");
                        }
                        break;
                    }
                }
            }
        }

        self.manager.stop_monitoring();
        Ok(())
    }

    fn report_monitor(&self) {
        match (self.manager.state(), self.manager.next_check_at()) {
            (MonitorState::Armed, Some(at)) => println!(
                "Watching session on {}. Next renewal check at {}.",
                self.navigator_path(),
                at.with_timezone(&Local).format("%H:%M:%S")
            ),
            (state, _) => println!("Monitor {:?} on {}.", state, self.navigator_path()),
        }
    }

    fn navigator_path(&self) -> String {
        self.navigator.current_path()
    }

    fn prompt_username() -> Result<String> {
        print!("Username: ");
        io::stdout().flush()?;

        let mut username = String::new();
        io::stdin().read_line(&mut username)?;
        Ok(username.trim().to_string())
    }

    fn prompt_password() -> Result<String> {
        let password = rpassword::prompt_password("Password: ")?;
        Ok(password)
    }
}

/// Render a duration as `1h 02m 05s`, `4m 10s` or `12s`
fn format_remaining(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}
