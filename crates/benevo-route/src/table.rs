//! The role-to-route table.

use std::collections::{HashMap, HashSet};

use benevo_types::Role;
use serde::{Deserialize, Serialize};

use crate::RouteError;

/// What one role may reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRoutes {
    /// Path prefixes owned by this role.
    pub prefixes: Vec<String>,
    /// Where a user of this role lands after being turned away.
    pub home: String,
    /// Where an incomplete profile must be finished. `None` for roles
    /// that have nothing to complete.
    #[serde(default)]
    pub completion_page: Option<String>,
    /// Roles whose sections this role can also reach.
    #[serde(default)]
    pub inherits: Vec<Role>,
}

/// Which paths each role may visit.
///
/// A path is matched against prefixes on segment boundaries: `/admin`
/// matches `/admin` and `/admin/users`, never `/administer`. The root
/// prefix `/` matches only `/` itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    /// Reachable by everyone, connected or not.
    pub public: Vec<String>,
    pub roles: HashMap<Role, RoleRoutes>,
    /// Where disconnected users are sent.
    pub landing: String,
    /// Where connected users without a role are sent.
    pub registration: String,
    pub login: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        let paths = |list: &[&str]| list.iter().map(|p| p.to_string()).collect::<Vec<_>>();

        let mut roles = HashMap::new();
        roles.insert(
            Role::Anonymous,
            RoleRoutes {
                prefixes: Vec::new(),
                home: "/".into(),
                completion_page: None,
                inherits: Vec::new(),
            },
        );
        roles.insert(
            Role::Volunteer,
            RoleRoutes {
                prefixes: paths(&["/volunteer", "/announcements", "/settings"]),
                home: "/volunteer".into(),
                completion_page: Some("/volunteer/complete-profile".into()),
                inherits: Vec::new(),
            },
        );
        roles.insert(
            Role::Association,
            RoleRoutes {
                prefixes: paths(&["/association", "/announcements", "/settings"]),
                home: "/association".into(),
                completion_page: Some("/association/complete-profile".into()),
                inherits: Vec::new(),
            },
        );
        roles.insert(
            Role::Admin,
            RoleRoutes {
                prefixes: paths(&["/admin"]),
                home: "/admin".into(),
                completion_page: None,
                inherits: vec![Role::Volunteer, Role::Association],
            },
        );

        Self {
            public: paths(&[
                "/",
                "/login",
                "/register",
                "/forgot-password",
                "/reset-password",
                "/about",
                "/legal",
            ]),
            roles,
            landing: "/".into(),
            registration: "/register".into(),
            login: "/login".into(),
        }
    }
}

impl RouteTable {
    /// Whether anyone may visit `path`.
    pub fn is_public(&self, path: &str) -> bool {
        let path = normalize(path);
        self.public.iter().any(|prefix| prefix_matches(prefix, path))
    }

    /// Every prefix `role` can reach: its own plus everything it inherits.
    pub fn effective_prefixes(&self, role: Role) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut prefixes = Vec::new();
        self.collect_prefixes(role, &mut seen, &mut prefixes);
        prefixes
    }

    fn collect_prefixes<'a>(&'a self, role: Role, seen: &mut HashSet<Role>, out: &mut Vec<&'a str>) {
        if !seen.insert(role) {
            return;
        }
        let Some(routes) = self.roles.get(&role) else {
            return;
        };
        for prefix in &routes.prefixes {
            if !out.contains(&prefix.as_str()) {
                out.push(prefix);
            }
        }
        for parent in &routes.inherits {
            self.collect_prefixes(*parent, seen, out);
        }
    }

    /// Whether `role`'s sections include `path`. Public paths are not
    /// considered here.
    pub fn allows(&self, role: Role, path: &str) -> bool {
        let path = normalize(path);
        self.effective_prefixes(role)
            .into_iter()
            .any(|prefix| prefix_matches(prefix, path))
    }

    /// The role's home page, or the landing page for unknown roles.
    pub fn home(&self, role: Role) -> &str {
        self.roles
            .get(&role)
            .map_or(self.landing.as_str(), |routes| routes.home.as_str())
    }

    pub fn completion_page(&self, role: Role) -> Option<&str> {
        self.roles
            .get(&role)
            .and_then(|routes| routes.completion_page.as_deref())
    }

    /// Checks the table for redirect loops and malformed paths.
    ///
    /// # Errors
    /// The first problem found, as a [`RouteError`].
    pub fn validate(&self) -> Result<(), RouteError> {
        let absolute = |path: &str| {
            if path.starts_with('/') {
                Ok(())
            } else {
                Err(RouteError::NotAbsolute(path.to_string()))
            }
        };

        for path in &self.public {
            absolute(path)?;
        }
        for page in [&self.landing, &self.registration, &self.login] {
            absolute(page)?;
            if !self.is_public(page) {
                return Err(RouteError::NotPublic(page.clone()));
            }
        }

        for (role, routes) in &self.roles {
            for path in routes.prefixes.iter().chain([&routes.home]) {
                absolute(path)?;
            }
            if let Some(page) = &routes.completion_page {
                absolute(page)?;
            }
            if self.inherits_from(*role, *role) {
                return Err(RouteError::InheritanceCycle(*role));
            }
            if !self.is_public(&routes.home) && !self.allows(*role, &routes.home) {
                return Err(RouteError::UnreachableHome {
                    role: *role,
                    home: routes.home.clone(),
                });
            }
        }
        Ok(())
    }

    fn inherits_from(&self, role: Role, target: Role) -> bool {
        let mut stack: Vec<Role> = self
            .roles
            .get(&role)
            .map(|routes| routes.inherits.clone())
            .unwrap_or_default();
        let mut seen = HashSet::new();
        while let Some(next) = stack.pop() {
            if next == target {
                return true;
            }
            if seen.insert(next) {
                if let Some(routes) = self.roles.get(&next) {
                    stack.extend(routes.inherits.iter().copied());
                }
            }
        }
        false
    }
}

/// Drops the query string and fragment, and any trailing slash except on
/// the root.
pub(crate) fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Segment-boundary prefix match. `/` matches only `/`.
pub(crate) fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = normalize(prefix);
    if prefix == "/" {
        return path == "/";
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
