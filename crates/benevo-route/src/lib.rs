//! Role-based route authorization for Benevo.
//!
//! Two layers:
//!
//! - [`decide`] is a pure function of (connected, role, profile completed,
//!   path) and a [`RouteTable`]. Easy to test, easy to reason about.
//! - [`NavigationGuard`] does the async groundwork first (restore, profile
//!   fetch, cookie cross-check) and then calls [`decide`].
//!
//! ```text
//! navigation ─→ NavigationGuard ─→ SessionCoordinator (restore / fetch_user)
//!                     │
//!                     └─→ decide(input, table) ─→ Allow | Redirect { to, reason }
//! ```

mod decide;
mod error;
mod guard;
mod table;

pub use decide::{decide, RedirectReason, RouteDecision, RouteInput};
pub use error::RouteError;
pub use guard::NavigationGuard;
pub use table::{RoleRoutes, RouteTable};
