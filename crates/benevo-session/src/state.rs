//! Observable session state.
//!
//! The coordinator owns the record. Everyone else sees it through a
//! [`SessionSnapshot`] (latest value, via `watch`) or a stream of
//! [`SessionEvent`]s (via `broadcast`).

use std::time::Duration;

use benevo_timer::TriggerSource;
use benevo_types::{Role, SessionRecord, UserId};

/// Where the session is in its lifecycle.
///
/// ```text
/// Absent ──restore()──→ Restoring ──found──→ Valid ⇄ Refreshing
///   ↑                        │                 │          │
///   └──────── none/expired ──┘      logout ────┘ terminal ┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Absent,
    Restoring,
    Valid,
    Refreshing,
}

impl SessionPhase {
    /// Valid or Refreshing: there is a record in memory.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Valid | Self::Refreshing)
    }
}

/// Progress of the one-time startup restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Restoration {
    #[default]
    NotStarted,
    InFlight,
    Done,
}

/// Immutable view of the session, published on every change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub restoration: Restoration,
    pub connected: bool,
    pub user_id: Option<UserId>,
    pub role: Option<Role>,
    pub profile_completed: bool,
    /// Whether a profile is cached at all.
    pub has_profile: bool,
    /// Last refresh failed transiently; the session is kept.
    pub degraded: bool,
    /// Bumped on every logout. Lets observers tell sessions apart.
    pub generation: u64,
}

impl SessionSnapshot {
    pub(crate) fn capture(
        phase: SessionPhase,
        restoration: Restoration,
        record: Option<&SessionRecord>,
        degraded: bool,
        generation: u64,
    ) -> Self {
        match record {
            Some(record) => Self {
                phase,
                restoration,
                connected: phase.is_live() && record.is_connected,
                user_id: Some(record.user_id.clone()),
                role: record.role(),
                profile_completed: record.profile_completed(),
                has_profile: record.cached_user_profile.is_some(),
                degraded,
                generation,
            },
            None => Self {
                phase,
                restoration,
                generation,
                ..Self::default()
            },
        }
    }
}

/// Why a session was ended without the user asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedLogoutReason {
    /// The identity provider refused the refresh token.
    RefreshRejected,
    /// No profile could be loaded and the token was confirmed invalid.
    ProfileFetchFailure,
}

impl std::fmt::Display for ForcedLogoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RefreshRejected => write!(f, "refresh rejected"),
            Self::ProfileFetchFailure => write!(f, "profile fetch failure"),
        }
    }
}

/// Lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { user_id: UserId },
    Restored { user_id: UserId },
    Refreshed { trigger: TriggerSource },
    /// Transient failure; the next attempt is in `retry_in`.
    RefreshDeferred { trigger: TriggerSource, retry_in: Duration },
    LoggedOut,
    ForcedLogout { reason: ForcedLogoutReason },
}

/// What a call to `refresh` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// Another refresh was already in flight.
    Skipped,
    NoSession,
    /// Transient failure, retry scheduled.
    Deferred,
    ForcedLogout,
    /// The session was logged out while the request was in flight.
    Discarded,
}
