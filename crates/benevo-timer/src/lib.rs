//! Refresh scheduling for Benevo.
//!
//! Three pieces decide WHEN a session's credentials get refreshed:
//!
//! - [`TokenExpiryScheduler`] reads the access token's `exp` claim and
//!   arms one timer that fires a little before expiry.
//! - [`RefreshGuard`] makes sure only one refresh is ever in flight, no
//!   matter how many triggers fire at once.
//! - [`VisibilityMonitor`] watches foreground/background transitions and
//!   asks for a refresh when the app comes back after a long absence.
//!
//! All three reach the session coordinator through the [`RefreshTrigger`]
//! seam or plain callbacks; none of them touches the session record.
//!
//! # Integration
//!
//! ```ignore
//! scheduler.arm(delay, move || async move {
//!     if let Some(coordinator) = weak.upgrade() {
//!         coordinator.refresh(TriggerSource::Timer).await;
//!     }
//! });
//! ```

#![allow(async_fn_in_trait)]

mod claims;
mod config;
mod scheduler;
mod visibility;

pub use claims::{decode_expiry, DecodeError};
pub use config::{SchedulerConfig, VisibilityConfig};
pub use scheduler::{
    DelaySource, RefreshGuard, RefreshPermit, ScheduledDelay, TokenExpiryScheduler, TriggerSource,
};
pub use visibility::{
    RefreshTrigger, VisibilityAction, VisibilityEvent, VisibilityHandle, VisibilityMonitor,
    VisibilityState,
};
