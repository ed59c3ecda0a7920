//! Unified error type for Benevo.

use benevo_route::RouteError;
use benevo_session::{IdentityError, SessionError};
use benevo_storage::StorageUnavailable;
use benevo_timer::DecodeError;
use benevo_types::CodecError;

/// Top-level error that wraps all crate-specific errors.
///
/// Applications using the `benevo` crate match on this one type. Each
/// variant converts from its crate's error with `?`.
#[derive(Debug, thiserror::Error)]
pub enum BenevoError {
    /// A session operation failed (no session, login refused, profile).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The identity provider failed outside of a session operation.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The route table is inconsistent.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// A storage tier failed (only when driving tiers directly).
    #[error(transparent)]
    Storage(#[from] StorageUnavailable),

    /// A record could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An access token's expiry could not be read.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
