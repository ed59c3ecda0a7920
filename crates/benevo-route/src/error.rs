//! Error types for the route layer.

use benevo_types::Role;

/// A [`RouteTable`](crate::RouteTable) that would send users in circles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// Prefixes and pages must be absolute paths.
    #[error("path {0:?} does not start with '/'")]
    NotAbsolute(String),

    /// A role's home page is neither public nor inside its own sections,
    /// so redirecting there would be redirected again.
    #[error("home {home:?} of {role} is not reachable by {role}")]
    UnreachableHome { role: Role, home: String },

    /// Landing, registration and login pages must be public.
    #[error("{0:?} must be a public path")]
    NotPublic(String),

    /// A role inherits (directly or not) from itself.
    #[error("role {0} inherits from itself")]
    InheritanceCycle(Role),
}
