//! # Benevo
//!
//! Session lifecycle and role-based route authorization for the Benevo
//! volunteering client.
//!
//! Benevo keeps one signed-in session per device alive across restarts
//! and backgrounding: it persists the session through a fallback chain of
//! storage tiers, refreshes credentials shortly before they expire (or
//! when the app returns after a long absence), and decides on every
//! navigation whether the current user may visit a path.
//!
//! Applications plug in two things: an [`IdentityProvider`] that talks to
//! the auth backend and a [`ProfileProvider`] that returns the current
//! user.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use benevo::prelude::*;
//!
//! let client = Client::builder()
//!     .storage_dir("/var/lib/myapp/benevo")
//!     .build(MyIdentity::new(), MyProfiles::new())?;
//! client.start().await;
//!
//! match client.navigate("/volunteer/missions").await {
//!     RouteDecision::Allow => { /* render */ }
//!     RouteDecision::Redirect { to, .. } => { /* go to `to` */ }
//! }
//! ```

mod client;
mod error;
mod telemetry;

pub use client::{Client, ClientBuilder};
pub use error::BenevoError;
pub use telemetry::init_tracing;

pub use benevo_route::{
    decide, NavigationGuard, RedirectReason, RoleRoutes, RouteDecision, RouteError, RouteInput,
    RouteTable,
};
pub use benevo_session::{
    ForcedLogoutReason, IdentityError, IdentityProvider, ProfileProvider, RefreshOutcome,
    RefreshedToken, Restoration, SessionConfig, SessionCoordinator, SessionError, SessionEvent,
    SessionPhase, SessionSnapshot, TokenGrant,
};
pub use benevo_storage::{
    AtomicFileTier, ConnectionCookie, DocumentFileTier, MemoryTier, SaveOutcome, StorageTier,
    StorageTierManager, StorageUnavailable,
};
pub use benevo_timer::{
    decode_expiry, DecodeError, RefreshTrigger, SchedulerConfig, TokenExpiryScheduler,
    TriggerSource, VisibilityConfig, VisibilityEvent,
};
pub use benevo_types::{
    Clock, CodecError, JsonCodec, ManualClock, ProfileCache, Role, SessionRecord, SystemClock,
    Timestamp, UserId, UserProfile,
};

/// Common imports for applications.
///
/// ```rust
/// use benevo::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BenevoError, Client, ClientBuilder, IdentityError, IdentityProvider, ProfileProvider,
        RefreshedToken, Role, RouteDecision, RouteTable, SessionConfig, SessionEvent,
        SessionPhase, SessionSnapshot, TokenGrant, UserId, UserProfile, VisibilityEvent,
    };
}
