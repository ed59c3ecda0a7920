//! The external collaborators the coordinator talks to.
//!
//! Benevo doesn't speak any particular identity protocol. An application
//! implements [`IdentityProvider`] and [`ProfileProvider`] over its own
//! HTTP client (or a mock, in tests) and hands them to the coordinator.
//!
//! # Example
//!
//! ```ignore
//! struct Backend { http: reqwest::Client }
//!
//! impl IdentityProvider for Backend {
//!     async fn exchange_credentials(&self, identifier: &str, secret: &str)
//!         -> Result<TokenGrant, IdentityError>
//!     {
//!         // POST /auth/login ...
//!     }
//!
//!     async fn exchange_refresh_token(&self, refresh_token: &str)
//!         -> Result<RefreshedToken, IdentityError>
//!     {
//!         // POST /auth/refresh ...
//!     }
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use benevo_types::{UserId, UserProfile};
use serde::{Deserialize, Serialize};

use crate::IdentityError;

/// Tokens issued at login or registration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: UserId,
    /// Lifetime of the access token, as reported by the provider.
    #[serde(default)]
    pub expires_in: Option<Duration>,
}

/// Result of exchanging a refresh token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedToken {
    pub access_token: String,
    /// Present only when the provider rotates refresh tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<Duration>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("user_id", &self.user_id)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("rotated", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Issues and renews tokens.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Logs in with an identifier (email) and secret (password).
    ///
    /// # Errors
    /// [`IdentityError::Rejected`] for bad credentials,
    /// [`IdentityError::Transient`] if the provider can't be reached.
    fn exchange_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> impl Future<Output = Result<TokenGrant, IdentityError>> + Send;

    /// Trades a refresh token for a new access token.
    ///
    /// # Errors
    /// [`IdentityError::Unauthorized`] if the refresh token was revoked.
    fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshedToken, IdentityError>> + Send;

    /// Asks whether `access_token` is still accepted.
    ///
    /// Providers without such an endpoint keep the default, which trusts
    /// the token.
    fn is_token_still_valid(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<bool, IdentityError>> + Send {
        let _ = access_token;
        async { Ok(true) }
    }
}

/// Fetches the logged-in user's profile.
pub trait ProfileProvider: Send + Sync + 'static {
    /// # Errors
    /// [`IdentityError::Unauthorized`] if the token is no longer accepted.
    fn fetch_current_user(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<UserProfile, IdentityError>> + Send;
}
