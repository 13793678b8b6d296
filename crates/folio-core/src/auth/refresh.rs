//! Proactive renewal of the session credential.
//!
//! `RefreshManager` owns a single deferred check. When the credential gets
//! within the refresh threshold of its expiry, the manager exchanges the
//! refresh companion for a new credential and schedules the next check from
//! the rotated one. Any renewal failure ends the session through the
//! [`SessionTerminator`].
//!
//! ```text
//! Idle --start--> Armed --threshold--> Renewing --ok--> Armed
//!   ^               |                     |
//!   +----stop-------+<------failure-------+
//! ```
//!
//! At most one timer is outstanding per manager (arming always cancels the
//! previous one) and at most one renewal is in flight.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, RenewRequest};
use crate::config::Config;

use super::token;
use super::{SessionStore, SessionTerminator};

/// Source of wall-clock time, used to compare against credential expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Performs the remote renewal call.
///
/// On success the implementation is expected to have rotated both cookies in
/// the session store; the manager re-reads the credential from there.
#[async_trait]
pub trait TokenRenewer: Send + Sync {
    async fn renew(&self, request: &RenewRequest) -> Result<(), ApiError>;
}

#[derive(Error, Debug)]
pub enum RenewError {
    #[error("No {0} available for renewal")]
    MissingCredential(&'static str),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Armed,
    Renewing,
}

/// Result of a single renewal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewOutcome {
    /// Another renewal was already in flight
    Skipped,
    Renewed,
    /// The session was terminated
    Failed,
}

/// What the scheduler should do given the current credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Lapse(&'static str),
    RenewNow,
    Arm(Duration),
}

struct Timer {
    id: u64,
    handle: JoinHandle<()>,
    /// `None` when the instant is beyond what `DateTime` can represent
    fires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    timer: Option<Timer>,
    next_timer_id: u64,
    /// Id of the renewal currently in flight
    renewing: Option<u64>,
    next_renewal_id: u64,
    /// Bumped by every stop, so a renewal can tell it was stopped mid-flight
    stops: u64,
}

impl Inner {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }
}

pub struct RefreshManager {
    store: Arc<SessionStore>,
    renewer: Arc<dyn TokenRenewer>,
    terminator: SessionTerminator,
    clock: Arc<dyn Clock>,
    threshold: Duration,
    inner: Mutex<Inner>,
}

/// Clears the in-flight marker on every exit path of a renewal
struct RenewalTicket<'a> {
    manager: &'a RefreshManager,
    id: u64,
    stops_at_start: u64,
}

impl RenewalTicket<'_> {
    fn stopped_since_start(&self) -> bool {
        self.manager.lock().stops != self.stops_at_start
    }
}

impl Drop for RenewalTicket<'_> {
    fn drop(&mut self) {
        let mut inner = self.manager.lock();
        if inner.renewing == Some(self.id) {
            inner.renewing = None;
        }
    }
}

impl RefreshManager {
    pub fn new(
        config: &Config,
        store: Arc<SessionStore>,
        renewer: Arc<dyn TokenRenewer>,
        terminator: SessionTerminator,
    ) -> Self {
        Self {
            store,
            renewer,
            terminator,
            clock: Arc::new(SystemClock),
            threshold: config.refresh_threshold(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn state(&self) -> MonitorState {
        let inner = self.lock();
        if inner.renewing.is_some() {
            MonitorState::Renewing
        } else if inner.timer.is_some() {
            MonitorState::Armed
        } else {
            MonitorState::Idle
        }
    }

    /// When the armed timer is due, if one is armed
    pub fn next_check_at(&self) -> Option<DateTime<Utc>> {
        self.lock().timer.as_ref().and_then(|t| t.fires_at)
    }

    /// Cancel any pending check and schedule from the current credential.
    ///
    /// Renews immediately, within this call, if the credential is already
    /// inside the refresh threshold.
    pub async fn start_monitoring(self: &Arc<Self>) {
        self.lock().cancel_timer();
        self.run_check().await;
    }

    /// Cancel the pending check and clear the in-flight marker. Idempotent.
    ///
    /// A renewal already on the wire is not interrupted, but it will not
    /// schedule a follow-up check when it completes.
    pub fn stop_monitoring(&self) {
        let mut inner = self.lock();
        inner.cancel_timer();
        inner.renewing = None;
        inner.stops += 1;
        debug!("Token monitoring stopped");
    }

    /// Renew right away if the credential expires within the threshold.
    ///
    /// Returns whether a renewal attempt was made.
    pub async fn refresh_now(self: &Arc<Self>) -> bool {
        let Some(credential) = self.store.session_token() else {
            return false;
        };
        if !token::is_expiring_soon_at(&credential, self.threshold, self.clock.now()) {
            return false;
        }
        self.renew().await != RenewOutcome::Skipped
    }

    /// Re-evaluate an armed timer against the wall clock.
    ///
    /// Timers run on a monotonic clock that may not advance while the host is
    /// suspended, so an armed check can end up firing after the credential is
    /// already inside the threshold. Calling this on resume (or periodically)
    /// reschedules from the real remaining time. No-op unless armed.
    pub async fn recheck(self: &Arc<Self>) {
        {
            let mut inner = self.lock();
            if inner.renewing.is_some() || inner.timer.is_none() {
                return;
            }
            inner.cancel_timer();
        }
        self.run_check().await;
    }

    fn plan(&self) -> Plan {
        let Some(credential) = self.store.session_token() else {
            return Plan::Lapse("no session credential");
        };

        let remaining = token::time_remaining_at(&credential, self.clock.now());
        if remaining.is_zero() {
            Plan::Lapse("session credential expired or unreadable")
        } else if remaining <= self.threshold {
            Plan::RenewNow
        } else {
            Plan::Arm(remaining - self.threshold)
        }
    }

    async fn run_check(self: &Arc<Self>) {
        match self.plan() {
            Plan::Lapse(reason) => debug!(reason, "Token monitoring lapsed"),
            Plan::Arm(delay) => self.arm(delay),
            Plan::RenewNow => {
                self.renew().await;
            }
        }
    }

    fn arm(self: &Arc<Self>, delay: Duration) {
        let fires_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delta| self.clock.now().checked_add_signed(delta));
        let weak = Arc::downgrade(self);

        let mut inner = self.lock();
        inner.next_timer_id += 1;
        let id = inner.next_timer_id;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = weak.upgrade() {
                manager.on_timer(id).await;
            }
        });

        inner.cancel_timer();
        inner.timer = Some(Timer {
            id,
            handle,
            fires_at,
        });
        debug!(delay_ms = delay.as_millis() as u64, ?fires_at, "Refresh check armed");
    }

    async fn on_timer(self: Arc<Self>, id: u64) {
        {
            let mut inner = self.lock();
            if inner.timer.as_ref().map(|t| t.id) != Some(id) {
                return;
            }
            // Detach without aborting: this is the task that is running
            inner.timer = None;
        }
        self.run_check().await;
    }

    fn begin_renewal(&self) -> Option<RenewalTicket<'_>> {
        let mut inner = self.lock();
        if inner.renewing.is_some() {
            return None;
        }
        inner.next_renewal_id += 1;
        let id = inner.next_renewal_id;
        inner.renewing = Some(id);
        Some(RenewalTicket {
            manager: self,
            id,
            stops_at_start: inner.stops,
        })
    }

    async fn renew(self: &Arc<Self>) -> RenewOutcome {
        let Some(ticket) = self.begin_renewal() else {
            debug!("Renewal already in flight, skipping");
            return RenewOutcome::Skipped;
        };

        match self.call_renewer().await {
            Ok(()) => {
                info!("Session credential renewed");
                if ticket.stopped_since_start() {
                    debug!("Monitoring stopped during renewal, not rescheduling");
                } else {
                    self.reschedule_after_renewal();
                }
                RenewOutcome::Renewed
            }
            Err(e) => {
                warn!(error = %e, "Session renewal failed");
                self.stop_monitoring();
                self.terminator.terminate();
                RenewOutcome::Failed
            }
        }
    }

    /// Schedule from the rotated credential while the renewal is still marked
    /// in flight, so a credential that is already inside the threshold is not
    /// renewed again in a loop.
    fn reschedule_after_renewal(self: &Arc<Self>) {
        match self.plan() {
            Plan::Arm(delay) => self.arm(delay),
            Plan::RenewNow => {
                warn!("Renewed credential is already inside the refresh threshold, monitoring lapsed")
            }
            Plan::Lapse(reason) => debug!(reason, "Token monitoring lapsed after renewal"),
        }
    }

    async fn call_renewer(&self) -> Result<(), RenewError> {
        let refresh_token = self
            .store
            .refresh_token()
            .ok_or(RenewError::MissingCredential("refresh token"))?;
        let username = self
            .store
            .username()
            .ok_or(RenewError::MissingCredential("username"))?;

        let request = RenewRequest {
            refresh_token,
            username,
        };
        self.renewer.renew(&request).await?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RefreshManager {
    fn drop(&mut self) {
        self.lock().cancel_timer();
    }
}

// ============================================================================
// Tests
// ============================================================================
