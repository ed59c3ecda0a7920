//! Error types for the data layer.

/// Errors that can occur while encoding or decoding session data.
///
/// Storage tiers map these into "corrupt record" classifications; they
/// are never shown to a user.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed (turning a record into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning stored bytes back into a record).
    ///
    /// Common causes: a truncated write, a record written by an older
    /// release with a different shape, or a tier that was edited by hand.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The bytes decoded, but the value breaks a data-model rule.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}
