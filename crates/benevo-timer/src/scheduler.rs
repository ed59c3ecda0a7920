//! Token expiry scheduler and the single-flight refresh guard.
//!
//! ## Timer lifecycle
//!
//! ```text
//!   arm(d1) ──→ [armed d1] ──arm(d2)──→ [armed d2] ──fires──→ callback()
//!                   │                        │
//!                disarm()                 disarm()
//!                   ▼                        ▼
//!               [idle]                   [idle]
//! ```
//!
//! At most one timer exists. Arming while armed replaces the old timer.
//! A firing timer removes itself from the slot BEFORE its callback runs,
//! so a callback that re-arms (which a refresh always does) never cancels
//! the task it is running on.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use benevo_types::{Role, Timestamp};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;

use crate::{decode_expiry, SchedulerConfig};

// ---------------------------------------------------------------------------
// TriggerSource
// ---------------------------------------------------------------------------

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerSource {
    /// The expiry timer fired.
    Timer,
    /// The app became visible (or resumed) after a long absence.
    Visibility,
    /// The window regained focus after a long absence.
    Focus,
    /// Application code asked directly.
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timer => write!(f, "timer"),
            Self::Visibility => write!(f, "visibility"),
            Self::Focus => write!(f, "focus"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

// ---------------------------------------------------------------------------
// RefreshGuard
// ---------------------------------------------------------------------------

/// Single-flight flag for refreshes.
///
/// [`try_begin`](Self::try_begin) either hands out the one permit or
/// returns `None` immediately. It never waits: a caller that loses the
/// race simply doesn't refresh.
#[derive(Debug, Clone, Default)]
pub struct RefreshGuard {
    in_flight: Arc<AtomicBool>,
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the permit if no refresh is running.
    pub fn try_begin(&self) -> Option<RefreshPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshPermit {
                in_flight: Arc::clone(&self.in_flight),
            })
    }

    /// Whether a refresh currently holds the permit.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Proof that this task owns the in-flight refresh. Dropping it (on any
/// path, including early returns) releases the guard.
#[derive(Debug)]
pub struct RefreshPermit {
    in_flight: Arc<AtomicBool>,
}

impl Drop for RefreshPermit {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Delay computation
// ---------------------------------------------------------------------------

/// Where a scheduled delay came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelaySource {
    /// Computed from the token's `exp` claim.
    TokenExpiry,
    /// The token was unreadable; role-based fallback interval.
    RoleDefault,
    /// Retry after a transient failure (fallback interval plus jitter).
    Retry,
}

/// A delay together with its provenance, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledDelay {
    pub delay: Duration,
    pub source: DelaySource,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct ArmedTimer {
    id: u64,
    delay: Duration,
    deadline: TokioInstant,
    handle: JoinHandle<()>,
}

/// Arms one refresh timer at a time and owns the refresh guard.
pub struct TokenExpiryScheduler {
    config: SchedulerConfig,
    timer: Arc<Mutex<Option<ArmedTimer>>>,
    next_id: AtomicU64,
    stopped: AtomicBool,
    guard: RefreshGuard,
}

impl TokenExpiryScheduler {
    /// Creates a scheduler. The config is validated first.
    pub fn new(config: SchedulerConfig) -> Self {
        let config = config.validated();
        tracing::debug!(
            lead_secs = config.lead_time.as_secs(),
            minimum_secs = config.minimum_delay.as_secs(),
            "token expiry scheduler created"
        );
        Self {
            config,
            timer: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            guard: RefreshGuard::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The single-flight guard shared by every refresh trigger.
    pub fn guard(&self) -> &RefreshGuard {
        &self.guard
    }

    /// Delay until the next proactive refresh of `access_token`.
    ///
    /// `max(exp - now - lead_time, minimum_delay)`, or `None` if the
    /// token's expiry can't be decoded.
    pub fn compute_delay(&self, access_token: &str, now: Timestamp) -> Option<Duration> {
        match decode_expiry(access_token) {
            Ok(expiry) => {
                let refresh_at = expiry.saturating_sub(self.config.lead_time);
                let delay = refresh_at.saturating_duration_since(now);
                Some(delay.max(self.config.minimum_delay))
            }
            Err(e) => {
                tracing::debug!(error = %e, "access token expiry unreadable");
                None
            }
        }
    }

    /// The fallback interval when the token can't tell us its expiry.
    pub fn default_interval(&self, role: Option<Role>) -> Duration {
        match role {
            Some(role) if role.is_elevated() => self.config.elevated_interval,
            _ => self.config.default_interval,
        }
    }

    /// [`compute_delay`](Self::compute_delay), falling back to
    /// [`default_interval`](Self::default_interval).
    pub fn delay_for(&self, access_token: &str, role: Option<Role>, now: Timestamp) -> ScheduledDelay {
        match self.compute_delay(access_token, now) {
            Some(delay) => ScheduledDelay {
                delay,
                source: DelaySource::TokenExpiry,
            },
            None => ScheduledDelay {
                delay: self.default_interval(role),
                source: DelaySource::RoleDefault,
            },
        }
    }

    /// Delay before retrying after a transient failure.
    pub fn retry_delay(&self, role: Option<Role>) -> ScheduledDelay {
        let base = self.default_interval(role);
        let jitter_ms = u64::try_from(self.config.retry_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        } else {
            Duration::ZERO
        };
        ScheduledDelay {
            delay: base + jitter,
            source: DelaySource::Retry,
        }
    }

    /// Cancels any pending timer and schedules `callback` after `delay`.
    ///
    /// Returns `false` (and schedules nothing) while the scheduler is
    /// stopped.
    pub fn arm<F, Fut>(&self, delay: Duration, callback: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.stopped.load(Ordering::SeqCst) {
            tracing::debug!("scheduler stopped, not arming");
            return false;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let slot = Arc::clone(&self.timer);

        // Hold the slot while spawning so the new task can't observe the
        // slot before its own entry is in it.
        let mut current = lock(&self.timer);
        if let Some(previous) = current.take() {
            previous.handle.abort();
            tracing::trace!(timer = previous.id, "previous refresh timer cancelled");
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = lock(&slot);
                if slot.as_ref().is_some_and(|timer| timer.id == id) {
                    // Detach: dropping our own JoinHandle does not abort us.
                    slot.take();
                }
            }
            tracing::trace!(timer = id, "refresh timer fired");
            callback().await;
        });

        *current = Some(ArmedTimer {
            id,
            delay,
            deadline: TokioInstant::now() + delay,
            handle,
        });
        tracing::debug!(timer = id, delay_secs = delay.as_secs(), "refresh timer armed");
        true
    }

    /// Cancels the pending timer, if any.
    pub fn disarm(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.handle.abort();
            tracing::debug!(timer = timer.id, "refresh timer disarmed");
        }
    }

    /// Whether a timer is pending.
    pub fn is_armed(&self) -> bool {
        lock(&self.timer).is_some()
    }

    /// The delay the pending timer was armed with.
    pub fn armed_delay(&self) -> Option<Duration> {
        lock(&self.timer).as_ref().map(|timer| timer.delay)
    }

    /// Time left before the pending timer fires.
    pub fn remaining(&self) -> Option<Duration> {
        lock(&self.timer)
            .as_ref()
            .map(|timer| timer.deadline.saturating_duration_since(TokioInstant::now()))
    }

    /// Allows arming again after [`stop`](Self::stop).
    pub fn start(&self) {
        if self.stopped.swap(false, Ordering::SeqCst) {
            tracing::debug!("token expiry scheduler started");
        }
    }

    /// Disarms and refuses to arm until [`start`](Self::start).
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.disarm();
        tracing::debug!("token expiry scheduler stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for TokenExpiryScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}

fn lock(slot: &Mutex<Option<ArmedTimer>>) -> MutexGuard<'_, Option<ArmedTimer>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
