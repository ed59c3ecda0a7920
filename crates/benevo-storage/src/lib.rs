//! Tiered persistent storage for the Benevo session record.
//!
//! A device keeps exactly one [`SessionRecord`](benevo_types::SessionRecord).
//! Any single storage backend can fail on a given device (disk full,
//! read-only profile, private-browsing style restrictions), so the record
//! is written through an ordered fallback chain of tiers:
//!
//! ```text
//! AtomicFileTier  (transactional: temp file + rename)
//!      ↓ on StorageUnavailable
//! DocumentFileTier (simple: one JSON document of key → value)
//!      ↓ on StorageUnavailable
//! MemoryTier      (ephemeral: gone when the process exits)
//! ```
//!
//! The [`StorageTierManager`] owns the chain. Tier failures never escape
//! it: a save that no tier accepts is logged and the session simply lives
//! in memory until the process ends.
//!
//! The [`ConnectionCookie`] is the small synchronous "is connected" flag
//! that route guards can read before the full record has been restored.

mod cookie;
mod error;
mod file;
mod manager;
mod tier;

pub use cookie::ConnectionCookie;
pub use error::StorageUnavailable;
pub use file::{AtomicFileTier, DocumentFileTier};
pub use manager::{first_success, Fallthrough, SaveOutcome, StorageTierManager, TierRead, RECORD_KEY};
pub use tier::{MemoryTier, StorageTier};
