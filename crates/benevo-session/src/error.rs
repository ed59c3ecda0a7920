//! Error types for the session layer.

/// Failures reported by the identity and profile collaborators.
///
/// The coordinator classifies these: [`Transient`](Self::Transient) keeps
/// the session and retries later, everything else ends it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The token was revoked or is otherwise no longer accepted.
    #[error("unauthorized")]
    Unauthorized,

    /// Timeouts, connection resets, 5xx. Worth retrying.
    #[error("identity provider unavailable: {0}")]
    Transient(String),

    /// The request itself was refused (bad credentials at login).
    #[error("rejected: {0}")]
    Rejected(String),
}

impl IdentityError {
    /// `true` if retrying can't help and the session must end.
    pub fn is_terminal(&self) -> bool {
        !self.is_recoverable()
    }

    /// `true` for failures that keep the session alive.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors surfaced by [`SessionCoordinator`](crate::SessionCoordinator).
///
/// Storage and scheduling problems never show up here: the coordinator
/// absorbs them and logs.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation needs a live session and there is none.
    #[error("no active session")]
    NoSession,

    /// Login or token exchange failed.
    #[error("identity provider: {0}")]
    Identity(#[from] IdentityError),

    /// The profile could not be fetched and nothing was cached.
    #[error("profile fetch failed: {0}")]
    ProfileFetch(#[source] IdentityError),

    /// A logout happened while this operation was waiting on the network.
    #[error("session changed while the request was in flight")]
    Superseded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_recoverable() {
        let e = IdentityError::Transient("timeout".into());
        assert!(e.is_recoverable());
        assert!(!e.is_terminal());
    }

    #[test]
    fn test_unauthorized_is_terminal() {
        assert!(IdentityError::Unauthorized.is_terminal());
        assert!(IdentityError::Rejected("nope".into()).is_terminal());
    }

    #[test]
    fn test_identity_error_converts() {
        let e: SessionError = IdentityError::Unauthorized.into();
        assert!(matches!(e, SessionError::Identity(IdentityError::Unauthorized)));
        assert_eq!(e.to_string(), "identity provider: unauthorized");
    }
}
