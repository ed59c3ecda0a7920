//! Navigation guard: the async wrapper around [`decide`].

use std::sync::Arc;

use benevo_session::{
    ForcedLogoutReason, IdentityProvider, ProfileProvider, SessionCoordinator, SessionSnapshot,
};

use crate::table::{normalize, prefix_matches};
use crate::{decide, RouteDecision, RouteInput, RouteTable};

/// Runs before every navigation.
///
/// 1. Waits for the startup restore (starting it if nobody has).
/// 2. For restricted sections, cross-checks the connection cookie against
///    the in-memory session. Restoration has always finished by this
///    point, so on disagreement the in-memory session wins.
/// 3. Makes sure a connected session has a profile. If none can be
///    fetched and the token turns out to be invalid, the session is
///    force-logged-out.
/// 4. Calls [`decide`].
///
/// Holds no counters or timers, so checking the same path twice in the
/// same state gives the same answer.
pub struct NavigationGuard<I, P> {
    coordinator: Arc<SessionCoordinator<I, P>>,
    table: Arc<RouteTable>,
    restricted: Vec<String>,
}

impl<I: IdentityProvider, P: ProfileProvider> NavigationGuard<I, P> {
    /// A guard whose restricted sections are `/admin`.
    pub fn new(coordinator: Arc<SessionCoordinator<I, P>>, table: Arc<RouteTable>) -> Self {
        Self {
            coordinator,
            table,
            restricted: vec!["/admin".into()],
        }
    }

    /// Replaces the list of sections that get the cookie cross-check.
    pub fn with_restricted(mut self, restricted: Vec<String>) -> Self {
        self.restricted = restricted;
        self
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Decides whether `path` may be visited now.
    pub async fn check(&self, path: &str) -> RouteDecision {
        let mut snapshot = self.coordinator.restore().await;

        if self.is_restricted(path) {
            self.cross_check_cookie(&snapshot);
        }

        if snapshot.connected && !snapshot.has_profile {
            snapshot = self.ensure_profile(snapshot).await;
        }

        let decision = decide(&RouteInput::from_snapshot(&snapshot, path), &self.table);
        if let RouteDecision::Redirect { to, reason } = &decision {
            tracing::debug!(path, to = to.as_str(), ?reason, "navigation redirected");
        }
        decision
    }

    fn is_restricted(&self, path: &str) -> bool {
        let path = normalize(path);
        self.restricted
            .iter()
            .any(|prefix| prefix_matches(prefix, path))
    }

    fn cross_check_cookie(&self, snapshot: &SessionSnapshot) {
        let cookie = self.coordinator.cookie().is_connected();
        if cookie != snapshot.connected {
            tracing::debug!(
                cookie,
                memory = snapshot.connected,
                "cookie disagrees with session, trusting memory"
            );
        }
    }

    async fn ensure_profile(&self, snapshot: SessionSnapshot) -> SessionSnapshot {
        match self.coordinator.fetch_user().await {
            Ok(_) => self.coordinator.snapshot(),
            Err(e) => {
                if self.coordinator.verify_token().await {
                    tracing::warn!(error = %e, "profile unavailable, token still valid");
                    snapshot
                } else {
                    tracing::warn!(error = %e, "profile unavailable and token invalid");
                    self.coordinator
                        .force_logout(ForcedLogoutReason::ProfileFetchFailure)
                        .await;
                    self.coordinator.snapshot()
                }
            }
        }
    }
}
