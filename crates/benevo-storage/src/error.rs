//! Error types for the storage layer.

/// A tier could not perform an operation.
///
/// This is a condition of the backend, not of the data: a quota was
/// hit, the backend is switched off, or the filesystem refused. The
/// manager reacts by moving on to the next tier; callers outside this
/// crate never see it.
#[derive(Debug, thiserror::Error)]
pub enum StorageUnavailable {
    /// Writing would exceed the tier's byte budget.
    #[error("tier {tier}: quota exceeded ({needed} bytes needed, {limit} allowed)")]
    QuotaExceeded {
        tier: String,
        needed: usize,
        limit: usize,
    },

    /// The tier has been turned off (by configuration or user preference).
    #[error("tier {0} is disabled")]
    Disabled(String),

    /// The underlying filesystem call failed.
    #[error("tier {tier}: i/o failed: {source}")]
    Io {
        tier: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageUnavailable {
    pub(crate) fn io(tier: &str, source: std::io::Error) -> Self {
        Self::Io {
            tier: tier.to_string(),
            source,
        }
    }
}
