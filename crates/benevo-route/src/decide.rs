//! The route decision function.
//!
//! Pure: same input, same table, same answer. All I/O (waiting for
//! restore, fetching a profile) happens in the guard before it calls
//! [`decide`].

use benevo_session::SessionSnapshot;
use benevo_types::Role;

use crate::table::{normalize, prefix_matches};
use crate::RouteTable;

/// Everything [`decide`] looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteInput<'a> {
    pub connected: bool,
    pub role: Option<Role>,
    pub profile_completed: bool,
    pub path: &'a str,
}

impl<'a> RouteInput<'a> {
    pub fn from_snapshot(snapshot: &SessionSnapshot, path: &'a str) -> Self {
        Self {
            connected: snapshot.connected,
            role: snapshot.role,
            profile_completed: snapshot.profile_completed,
            path,
        }
    }
}

/// Why a navigation was redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    NotConnected,
    /// Connected, but the profile has no role yet.
    MissingRole,
    ProfileIncomplete,
    /// The role may not visit this section.
    Forbidden,
}

/// Outcome of a navigation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect { to: String, reason: RedirectReason },
}

impl RouteDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Where to go instead, if redirected.
    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Redirect { to, .. } => Some(to),
        }
    }

    fn redirect(to: &str, reason: RedirectReason) -> Self {
        Self::Redirect {
            to: to.to_string(),
            reason,
        }
    }
}

/// Decides whether `input.path` may be visited. First matching rule wins:
///
/// 1. public path: allow
/// 2. not connected: landing page
/// 3. no role (or `ANONYMOUS`): registration page
/// 4. profile incomplete: the role's completion page (allowed if already
///    there); roles without one skip this rule
/// 5. outside the role's sections: the role's home
/// 6. allow
pub fn decide(input: &RouteInput<'_>, table: &RouteTable) -> RouteDecision {
    let path = normalize(input.path);

    if table.is_public(path) {
        return RouteDecision::Allow;
    }

    if !input.connected {
        return RouteDecision::redirect(&table.landing, RedirectReason::NotConnected);
    }

    let role = match input.role {
        Some(Role::Anonymous) | None => {
            return RouteDecision::redirect(&table.registration, RedirectReason::MissingRole);
        }
        Some(role) => role,
    };

    if !input.profile_completed {
        if let Some(page) = table.completion_page(role) {
            return if prefix_matches(page, path) {
                RouteDecision::Allow
            } else {
                RouteDecision::redirect(page, RedirectReason::ProfileIncomplete)
            };
        }
    }

    if !table.allows(role, path) {
        return RouteDecision::redirect(table.home(role), RedirectReason::Forbidden);
    }

    RouteDecision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(connected: bool, role: Option<Role>, completed: bool, path: &str) -> RouteInput<'_> {
        RouteInput {
            connected,
            role,
            profile_completed: completed,
            path,
        }
    }

    fn redirect(to: &str, reason: RedirectReason) -> RouteDecision {
        RouteDecision::Redirect {
            to: to.into(),
            reason,
        }
    }

    #[test]
    fn test_public_path_allowed_when_disconnected() {
        let table = RouteTable::default();
        assert_eq!(decide(&input(false, None, false, "/about"), &table), RouteDecision::Allow);
    }

    #[test]
    fn test_disconnected_goes_to_landing() {
        let table = RouteTable::default();
        assert_eq!(
            decide(&input(false, None, false, "/volunteer"), &table),
            redirect("/", RedirectReason::NotConnected)
        );
    }

    #[test]
    fn test_connected_without_role_goes_to_registration() {
        let table = RouteTable::default();
        assert_eq!(
            decide(&input(true, None, false, "/volunteer"), &table),
            redirect("/register", RedirectReason::MissingRole)
        );
    }

    #[test]
    fn test_anonymous_role_treated_as_missing() {
        let table = RouteTable::default();
        assert_eq!(
            decide(&input(true, Some(Role::Anonymous), true, "/settings"), &table),
            redirect("/register", RedirectReason::MissingRole)
        );
    }

    #[test]
    fn test_incomplete_volunteer_goes_to_completion_page() {
        let table = RouteTable::default();
        assert_eq!(
            decide(&input(true, Some(Role::Volunteer), false, "/volunteer"), &table),
            redirect("/volunteer/complete-profile", RedirectReason::ProfileIncomplete)
        );
    }

    #[test]
    fn test_incomplete_volunteer_allowed_on_completion_page() {
        let table = RouteTable::default();
        assert_eq!(
            decide(
                &input(true, Some(Role::Volunteer), false, "/volunteer/complete-profile?step=2"),
                &table
            ),
            RouteDecision::Allow
        );
    }

    #[test]
    fn test_incomplete_admin_skips_completion_rule() {
        let table = RouteTable::default();
        assert_eq!(
            decide(&input(true, Some(Role::Admin), false, "/admin/users"), &table),
            RouteDecision::Allow
        );
    }

    #[test]
    fn test_volunteer_forbidden_from_association_section() {
        let table = RouteTable::default();
        assert_eq!(
            decide(&input(true, Some(Role::Volunteer), true, "/association/members"), &table),
            redirect("/volunteer", RedirectReason::Forbidden)
        );
    }

    #[test]
    fn test_association_forbidden_from_admin() {
        let table = RouteTable::default();
        assert_eq!(
            decide(&input(true, Some(Role::Association), true, "/administer"), &table),
            redirect("/association", RedirectReason::Forbidden)
        );
    }

    #[test]
    fn test_shared_section_allowed_for_both_roles() {
        let table = RouteTable::default();
        for role in [Role::Volunteer, Role::Association, Role::Admin] {
            assert!(decide(&input(true, Some(role), true, "/announcements/42"), &table).is_allowed());
        }
    }

    #[test]
    fn test_redirect_target_accessor() {
        let table = RouteTable::default();
        let decision = decide(&input(false, None, false, "/settings"), &table);
        assert_eq!(decision.redirect_target(), Some("/"));
        assert_eq!(RouteDecision::Allow.redirect_target(), None);
    }
}
