//! Identity and session types.
//!
//! Everything here is plain data: it can be cloned into snapshots,
//! serialized into a storage tier, and compared in tests.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Timestamp;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The identity provider's id for a user.
///
/// Newtype wrapper so a user id can't be passed where a token is
/// expected (both are strings underneath).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a raw id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// What kind of account a user holds.
///
/// `Anonymous` is the role of somebody who is not logged in. A logged-in
/// user whose profile carries no role yet has `None`, not `Anonymous`;
/// the route controller treats both the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Anonymous,
    Volunteer,
    Association,
    Admin,
}

impl Role {
    /// Every role, in table order.
    pub const ALL: [Role; 4] = [
        Role::Anonymous,
        Role::Volunteer,
        Role::Association,
        Role::Admin,
    ];

    /// Roles that refresh more aggressively when the token's own expiry
    /// can't be read.
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "ANONYMOUS"),
            Self::Volunteer => write!(f, "VOLUNTEER"),
            Self::Association => write!(f, "ASSOCIATION"),
            Self::Admin => write!(f, "ADMIN"),
        }
    }
}

// ---------------------------------------------------------------------------
// UserProfile
// ---------------------------------------------------------------------------

/// The logged-in user as the profile service describes them.
///
/// Only the fields that drive routing are modeled; business fields
/// (addresses, skills, association details) live elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// `None` until the user picks volunteer or association at sign-up.
    #[serde(default)]
    pub role: Option<Role>,
    /// `false` until the role-specific registration form is submitted.
    #[serde(default)]
    pub profile_completed: bool,
}

// ---------------------------------------------------------------------------
// ProfileCache
// ---------------------------------------------------------------------------

/// A cached profile with the two timestamps that decide whether to refetch.
///
/// ```text
/// fetched_at ──────── cache_ttl ────────→ stale
///        updated_at ──────── cache_ttl ────────→ stale
/// ```
///
/// A local edit (say, the user just finished the profile form) is newer
/// than what the server last sent, so refetching right away would throw
/// it away. The edit therefore restarts the TTL window. Once that window
/// runs out the server is asked again, so role or completion changes made
/// server-side still reach the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCache {
    pub data: UserProfile,
    /// When the profile last came from the network.
    pub fetched_at: Timestamp,
    /// When the profile was last changed locally (or fetched, if never edited).
    pub updated_at: Timestamp,
}

impl ProfileCache {
    /// A cache entry for a profile that just came from the network.
    pub fn fetched(data: UserProfile, now: Timestamp) -> Self {
        Self {
            data,
            fetched_at: now,
            updated_at: now,
        }
    }

    /// `true` while `now - fetched_at < ttl`.
    pub fn is_valid(&self, now: Timestamp, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }

    /// `true` if the profile was edited locally after the last fetch.
    pub fn is_fresher_than_fetch(&self) -> bool {
        self.updated_at > self.fetched_at
    }

    /// Whether the cached value can be returned without a network call:
    /// `true` while `now` is within `ttl` of the later of the last fetch
    /// and the last local edit.
    pub fn can_serve(&self, now: Timestamp, ttl: Duration) -> bool {
        let freshest = self.fetched_at.max(self.updated_at);
        now.saturating_duration_since(freshest) < ttl
    }

    /// Replaces the data after a local edit.
    pub fn apply_local_update(&mut self, data: UserProfile, now: Timestamp) {
        self.data = data;
        // A same-millisecond edit right after a fetch must still count as newer.
        self.updated_at = if now > self.fetched_at {
            now
        } else {
            self.fetched_at.saturating_add(Duration::from_millis(1))
        };
    }
}

// ---------------------------------------------------------------------------
// SessionRecord
// ---------------------------------------------------------------------------

/// The durable "this device is logged in as this user" record.
///
/// Invariant: `expires_at == last_activity_at + session_ttl`. The only
/// ways to move either timestamp are [`SessionRecord::new`] and
/// [`SessionRecord::touch`], which keep them in step.
///
/// An expired record is equivalent to no record at all.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: UserId,
    pub is_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_user_profile: Option<ProfileCache>,
    last_activity_at: Timestamp,
    expires_at: Timestamp,
}

impl SessionRecord {
    /// A freshly issued, connected session.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user_id: UserId,
        now: Timestamp,
        session_ttl: Duration,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            user_id,
            is_connected: true,
            cached_user_profile: None,
            last_activity_at: now,
            expires_at: now.saturating_add(session_ttl),
        }
    }

    /// Marks activity at `now` and slides the expiry forward.
    pub fn touch(&mut self, now: Timestamp, session_ttl: Duration) {
        self.last_activity_at = now;
        self.expires_at = now.saturating_add(session_ttl);
    }

    /// `true` if `expires_at` is strictly in the future.
    pub fn is_usable(&self, now: Timestamp) -> bool {
        self.expires_at > now
    }

    pub fn last_activity_at(&self) -> Timestamp {
        self.last_activity_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// The cached profile's role, if a profile is cached.
    pub fn role(&self) -> Option<Role> {
        self.cached_user_profile
            .as_ref()
            .and_then(|cache| cache.data.role)
    }

    /// Whether the cached profile says registration is complete.
    pub fn profile_completed(&self) -> bool {
        self.cached_user_profile
            .as_ref()
            .is_some_and(|cache| cache.data.profile_completed)
    }
}

/// Tokens are redacted so a record can be logged with `?record`.
impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("is_connected", &self.is_connected)
            .field("cached_user_profile", &self.cached_user_profile)
            .field("last_activity_at", &self.last_activity_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
