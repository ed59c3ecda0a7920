//! Reading the `exp` claim out of an access token.
//!
//! The token is a JWT: `header.payload.signature`, each part base64url.
//! We only need the payload's `exp` (seconds since the epoch) to know
//! when to refresh. The signature is NOT checked: the identity provider
//! is the one that verifies tokens, and a forged `exp` can at worst make
//! this client refresh at the wrong time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use benevo_types::Timestamp;
use serde::Deserialize;

/// Why a token's expiry could not be read.
///
/// Never fatal: the scheduler falls back to a role-based interval.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not `header.payload.signature`.
    #[error("token is not a three-part JWT")]
    Malformed,

    #[error("token payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload has no usable numeric `exp`.
    #[error("token has no exp claim")]
    MissingExpiry,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<f64>,
}

/// Decodes the `exp` claim of `token` as a timestamp.
pub fn decode_expiry(token: &str) -> Result<Timestamp, DecodeError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(DecodeError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let claims: Claims = serde_json::from_slice(&bytes)?;

    match claims.exp {
        Some(exp) if exp.is_finite() && exp >= 0.0 => Ok(Timestamp::from_millis((exp * 1000.0) as u64)),
        _ => Err(DecodeError::MissingExpiry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_decode_expiry_reads_exp_seconds() {
        let token = token_with_payload(r#"{"sub":"u-1","exp":1700000000}"#);
        assert_eq!(decode_expiry(&token).unwrap(), Timestamp::from_secs(1_700_000_000));
    }

    #[test]
    fn test_decode_expiry_accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(br#"{"exp":12}"#);
        let token = format!("h.{payload}.s");
        assert_eq!(decode_expiry(&token).unwrap(), Timestamp::from_secs(12));
    }

    #[test]
    fn test_decode_expiry_opaque_token_is_malformed() {
        assert!(matches!(
            decode_expiry("opaque-refresh-token"),
            Err(DecodeError::Malformed)
        ));
    }

    #[test]
    fn test_decode_expiry_four_parts_is_malformed() {
        assert!(matches!(decode_expiry("a.b.c.d"), Err(DecodeError::Malformed)));
    }

    #[test]
    fn test_decode_expiry_bad_base64_is_error() {
        assert!(matches!(decode_expiry("a.!!!.c"), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_decode_expiry_non_json_payload_is_error() {
        let token = token_with_payload("not json");
        assert!(matches!(decode_expiry(&token), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_expiry_missing_claim_is_error() {
        let token = token_with_payload(r#"{"sub":"u-1"}"#);
        assert!(matches!(decode_expiry(&token), Err(DecodeError::MissingExpiry)));
    }

    #[test]
    fn test_decode_expiry_string_claim_is_error() {
        let token = token_with_payload(r#"{"exp":"tomorrow"}"#);
        assert!(decode_expiry(&token).is_err());
    }
}
