//! Session lifecycle for Benevo.
//!
//! This crate keeps a user logged in across restarts, backgrounding and
//! network trouble:
//!
//! 1. **Restore**: on startup, load the stored record ([`SessionCoordinator::restore`])
//! 2. **Refresh**: renew the access token before it expires, one refresh
//!    at a time ([`SessionCoordinator::refresh`])
//! 3. **Checkpoint**: persist periodically so a crash loses little
//! 4. **Logout**: explicit, or forced when the provider rejects the session
//!
//! # How it fits in the stack
//!
//! ```text
//! Route guards (above)  ← read snapshots, call restore / fetch_user
//!     ↕
//! Session layer (this crate)  ← owns the record, talks to the identity provider
//!     ↕
//! Storage tiers + refresh scheduler (below)
//! ```

#![allow(async_fn_in_trait)]

mod config;
mod coordinator;
mod error;
mod identity;
mod state;

pub use config::SessionConfig;
pub use coordinator::SessionCoordinator;
pub use error::{IdentityError, SessionError};
pub use identity::{IdentityProvider, ProfileProvider, RefreshedToken, TokenGrant};
pub use state::{
    ForcedLogoutReason, RefreshOutcome, Restoration, SessionEvent, SessionPhase, SessionSnapshot,
};
