//! Codec trait and implementations for persisting session data.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Storage tiers only ever see bytes; the [`Codec`] decides what those
//! bytes look like. [`JsonCodec`] is the default because a JSON record
//! can be inspected by hand when a device misbehaves.

use serde::{de::DeserializeOwned, Serialize};

use crate::CodecError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the storage manager that owns the codec
/// is shared between the coordinator, its timer callbacks and its
/// checkpoint task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`CodecError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`CodecError::Decode`] if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use benevo_types::{Codec, JsonCodec, Role};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Role::Volunteer).unwrap();
/// assert_eq!(bytes, br#""VOLUNTEER""#);
///
/// let decoded: Role = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, Role::Volunteer);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(data).map_err(CodecError::Decode)
    }
}
