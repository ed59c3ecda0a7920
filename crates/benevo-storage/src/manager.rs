//! The storage tier manager: one session record, many backends.
//!
//! ## Rules
//!
//! - **Read**: tiers in priority order; the first tier holding a present
//!   AND unexpired record wins. An expired or undecodable record is
//!   deleted from its tier on sight, and the search continues.
//! - **Write**: highest-priority tier first; fall through to the next
//!   tier only when a tier reports [`StorageUnavailable`]. Once a tier
//!   accepts, every OTHER tier is cleared so an older copy can never
//!   shadow the new one on the next read.
//! - **Clear**: every tier, regardless of individual failures.
//!
//! None of these operations return an error. Failures are logged.

use std::sync::Arc;

use benevo_types::{Clock, Codec, CodecError, JsonCodec, SessionRecord, Timestamp};
use futures_util::stream::{self, Stream, StreamExt};

use crate::{StorageTier, StorageUnavailable};

/// The fixed key the session record is stored under in every tier.
pub const RECORD_KEY: &str = "current";

// ---------------------------------------------------------------------------
// Fallthrough combinator
// ---------------------------------------------------------------------------

/// The result of running attempts until one succeeds.
#[derive(Debug)]
pub struct Fallthrough<T> {
    /// Index and value of the first successful attempt, if any.
    pub winner: Option<(usize, T)>,
    /// Every failure seen before the winner (or all of them if none won).
    pub failures: Vec<StorageUnavailable>,
}

/// Polls `attempts` in order and stops at the first `Ok`.
///
/// The stream is lazy: attempts after the winner are never started.
/// With `stream::iter(tiers).then(|tier| tier.write(..))` that means
/// lower-priority tiers are only touched when the ones above them fail.
pub async fn first_success<S, T>(attempts: S) -> Fallthrough<T>
where
    S: Stream<Item = Result<T, StorageUnavailable>>,
{
    let mut attempts = std::pin::pin!(attempts);
    let mut failures = Vec::new();
    let mut index = 0;

    while let Some(attempt) = attempts.next().await {
        match attempt {
            Ok(value) => {
                return Fallthrough {
                    winner: Some((index, value)),
                    failures,
                };
            }
            Err(e) => failures.push(e),
        }
        index += 1;
    }

    Fallthrough {
        winner: None,
        failures,
    }
}

// ---------------------------------------------------------------------------
// TierRead
// ---------------------------------------------------------------------------

/// What a single tier's read turned out to be.
#[derive(Debug)]
pub enum TierRead {
    /// A decodable, unexpired record.
    Hit(SessionRecord),
    /// Nothing stored.
    Miss,
    /// A record whose `expires_at` is not in the future.
    Expired(SessionRecord),
    /// Bytes that don't decode as a record.
    Corrupt(CodecError),
    /// The tier itself failed.
    Unavailable(StorageUnavailable),
}

impl TierRead {
    /// Classifies a raw tier read at time `now`.
    pub fn classify<C: Codec>(
        codec: &C,
        raw: Result<Option<Vec<u8>>, StorageUnavailable>,
        now: Timestamp,
    ) -> Self {
        let bytes = match raw {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Self::Miss,
            Err(e) => return Self::Unavailable(e),
        };
        match codec.decode::<SessionRecord>(&bytes) {
            Ok(record) if record.is_usable(now) => Self::Hit(record),
            Ok(record) => Self::Expired(record),
            Err(e) => Self::Corrupt(e),
        }
    }

    /// Whether the tier should be cleared after this read.
    pub fn needs_clearing(&self) -> bool {
        matches!(self, Self::Expired(_) | Self::Corrupt(_))
    }
}

// ---------------------------------------------------------------------------
// SaveOutcome
// ---------------------------------------------------------------------------

/// Where a save ended up. Purely informational: callers never have to
/// handle a failed save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The tier at `index` accepted the record.
    Persisted { index: usize, tier: String },
    /// No tier accepted; the record exists only in memory.
    MemoryOnly,
}

impl SaveOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted { .. })
    }
}

// ---------------------------------------------------------------------------
// StorageTierManager
// ---------------------------------------------------------------------------

/// Ordered fallback chain holding the device's single session record.
///
/// The manager is the only thing that knows there is more than one place
/// a record can live. Callers see three operations and never a tier error:
///
/// - [`save`](Self::save) walks the chain from the top and stops at the
///   first tier that accepts the write. Every other tier then has its copy
///   removed, so an older record left in a higher tier can never shadow
///   the one just written. If nothing accepts it, that is logged and the
///   session keeps living in memory.
/// - [`load`](Self::load) walks the chain from the top too, but skips
///   tiers whose copy is missing, expired or undecodable. Expired and
///   undecodable copies are deleted on the way past, so the next load
///   doesn't trip over them again.
/// - [`clear`](Self::clear) removes the record everywhere it can.
///
/// # Example
///
/// ```rust,ignore
/// let storage = StorageTierManager::new(
///     vec![
///         Box::new(AtomicFileTier::new(dir.join("session"))),
///         Box::new(MemoryTier::new("memory")),
///     ],
///     Arc::new(SystemClock),
/// );
///
/// if let SaveOutcome::Persisted { tier, .. } = storage.save(&record).await {
///     println!("saved to {tier}");
/// }
/// let restored = storage.load().await;
/// ```
///
/// Generic over the [`Codec`] so the byte format can change without
/// touching tiers. Defaults to [`JsonCodec`].
pub struct StorageTierManager<C: Codec = JsonCodec> {
    tiers: Vec<Box<dyn StorageTier>>,
    codec: C,
    clock: Arc<dyn Clock>,
}

impl StorageTierManager<JsonCodec> {
    /// A manager over `tiers` (highest priority first) using JSON.
    pub fn new(tiers: Vec<Box<dyn StorageTier>>, clock: Arc<dyn Clock>) -> Self {
        Self::with_codec(tiers, JsonCodec, clock)
    }
}

impl<C: Codec> StorageTierManager<C> {
    /// A manager over `tiers` with an explicit codec.
    pub fn with_codec(tiers: Vec<Box<dyn StorageTier>>, codec: C, clock: Arc<dyn Clock>) -> Self {
        if tiers.is_empty() {
            tracing::warn!("storage manager created with no tiers; sessions will not survive restarts");
        }
        Self {
            tiers,
            codec,
            clock,
        }
    }

    /// Tier names in priority order.
    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|tier| tier.name()).collect()
    }

    /// Persists `record` to the highest-priority tier that accepts it.
    pub async fn save(&self, record: &SessionRecord) -> SaveOutcome {
        let payload = match self.codec.encode(record) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "session record could not be encoded; keeping it in memory only");
                return SaveOutcome::MemoryOnly;
            }
        };

        let attempts = stream::iter(self.tiers.iter())
            .then(|tier| tier.write(RECORD_KEY, &payload));
        let result = first_success(attempts).await;

        for failure in &result.failures {
            tracing::warn!(error = %failure, "storage tier rejected session write, falling through");
        }

        match result.winner {
            Some((index, ())) => {
                self.remove_everywhere_except(index).await;
                let tier = self.tiers[index].name().to_string();
                tracing::debug!(%tier, index, "session record persisted");
                SaveOutcome::Persisted { index, tier }
            }
            None => {
                tracing::warn!(
                    tiers = self.tiers.len(),
                    "no storage tier accepted the session record; it lives in memory only"
                );
                SaveOutcome::MemoryOnly
            }
        }
    }

    /// Returns the first present, unexpired record, or `None`.
    pub async fn load(&self) -> Option<SessionRecord> {
        self.locate().await.map(|(_, record)| record)
    }

    /// Like [`load`](Self::load), also reporting which tier held the record.
    pub async fn locate(&self) -> Option<(usize, SessionRecord)> {
        let now = self.clock.now();

        for (index, tier) in self.tiers.iter().enumerate() {
            let read = TierRead::classify(&self.codec, tier.read(RECORD_KEY).await, now);

            if read.needs_clearing() {
                if let Err(e) = tier.remove(RECORD_KEY).await {
                    tracing::warn!(tier = tier.name(), error = %e, "could not clear stale record");
                }
            }

            match read {
                TierRead::Hit(record) => {
                    tracing::debug!(tier = tier.name(), index, user_id = %record.user_id, "session record loaded");
                    return Some((index, record));
                }
                TierRead::Miss => {}
                TierRead::Expired(record) => {
                    tracing::info!(
                        tier = tier.name(),
                        expired_at = %record.expires_at(),
                        "expired session record cleared"
                    );
                }
                TierRead::Corrupt(e) => {
                    tracing::warn!(tier = tier.name(), error = %e, "corrupt session record cleared");
                }
                TierRead::Unavailable(e) => {
                    tracing::warn!(tier = tier.name(), error = %e, "storage tier unreadable, falling through");
                }
            }
        }

        None
    }

    /// Removes the record from every tier. Never fails.
    pub async fn clear(&self) {
        for tier in &self.tiers {
            if let Err(e) = tier.remove(RECORD_KEY).await {
                tracing::warn!(tier = tier.name(), error = %e, "could not clear session record");
            }
        }
        tracing::debug!("session record cleared from all tiers");
    }

    async fn remove_everywhere_except(&self, keep: usize) {
        for (index, tier) in self.tiers.iter().enumerate() {
            if index == keep {
                continue;
            }
            if let Err(e) = tier.remove(RECORD_KEY).await {
                tracing::debug!(tier = tier.name(), error = %e, "could not drop superseded record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use benevo_types::{ManualClock, UserId};

    use super::*;
    use crate::MemoryTier;

    fn record_at(now: Timestamp, ttl: Duration) -> SessionRecord {
        SessionRecord::new("access", "refresh", UserId::new("u-1"), now, ttl)
    }

    fn disabled(name: &str) -> StorageUnavailable {
        StorageUnavailable::Disabled(name.to_string())
    }

    // =====================================================================
    // first_success()
    // =====================================================================

    #[tokio::test]
    async fn test_first_success_picks_first_ok() {
        let attempts = stream::iter(vec![Err(disabled("a")), Ok(2), Ok(3)]);

        let result = first_success(attempts).await;

        assert_eq!(result.winner.map(|(i, v)| (i, v)), Some((1, 2)));
        assert_eq!(result.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_first_success_all_failed_collects_every_failure() {
        let attempts = stream::iter(vec![
            Err::<(), _>(disabled("a")),
            Err(disabled("b")),
            Err(disabled("c")),
        ]);

        let result = first_success(attempts).await;

        assert!(result.winner.is_none());
        assert_eq!(result.failures.len(), 3);
    }

    #[tokio::test]
    async fn test_first_success_stops_polling_after_winner() {
        let polled = std::sync::atomic::AtomicUsize::new(0);
        let attempts = stream::iter(0..3).then(|i| {
            polled.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move { Ok::<_, StorageUnavailable>(i) }
        });

        let result = first_success(attempts).await;

        assert_eq!(result.winner.map(|(i, _)| i), Some(0));
        assert_eq!(polled.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_success_empty_stream_has_no_winner() {
        let attempts = stream::iter(Vec::<Result<(), StorageUnavailable>>::new());
        let result = first_success(attempts).await;
        assert!(result.winner.is_none());
        assert!(result.failures.is_empty());
    }

    // =====================================================================
    // TierRead::classify()
    // =====================================================================

    #[test]
    fn test_classify_missing_is_miss() {
        let read = TierRead::classify(&JsonCodec, Ok(None), Timestamp::from_millis(0));
        assert!(matches!(read, TierRead::Miss));
    }

    #[test]
    fn test_classify_unexpired_is_hit() {
        let now = Timestamp::from_millis(10_000);
        let bytes = JsonCodec.encode(&record_at(now, Duration::from_secs(60))).unwrap();

        let read = TierRead::classify(&JsonCodec, Ok(Some(bytes)), now);

        assert!(matches!(read, TierRead::Hit(_)));
        assert!(!read.needs_clearing());
    }

    #[test]
    fn test_classify_expired_at_boundary() {
        let issued = Timestamp::from_millis(0);
        let bytes = JsonCodec.encode(&record_at(issued, Duration::from_secs(1))).unwrap();

        // expires_at == now counts as expired.
        let read = TierRead::classify(&JsonCodec, Ok(Some(bytes)), Timestamp::from_millis(1_000));

        assert!(matches!(read, TierRead::Expired(_)));
        assert!(read.needs_clearing());
    }

    #[test]
    fn test_classify_garbage_is_corrupt() {
        let read = TierRead::classify(
            &JsonCodec,
            Ok(Some(b"<html>".to_vec())),
            Timestamp::from_millis(0),
        );
        assert!(matches!(read, TierRead::Corrupt(_)));
        assert!(read.needs_clearing());
    }

    #[test]
    fn test_classify_tier_error_is_unavailable() {
        let read = TierRead::classify(&JsonCodec, Err(disabled("a")), Timestamp::from_millis(0));
        assert!(matches!(read, TierRead::Unavailable(_)));
        assert!(!read.needs_clearing());
    }

    // =====================================================================
    // save() / load()
    // =====================================================================

    #[tokio::test]
    async fn test_save_supersedes_copies_in_lower_tiers() {
        let clock = ManualClock::new(Timestamp::from_millis(1_000));
        let first = MemoryTier::new("first");
        let second = MemoryTier::new("second");
        let manager = StorageTierManager::new(
            vec![Box::new(first.clone()), Box::new(second.clone())],
            Arc::new(clock.clone()),
        );
        // An old copy sits in the second tier.
        second.write(RECORD_KEY, b"stale").await.unwrap();

        let outcome = manager.save(&record_at(clock.now(), Duration::from_secs(60))).await;

        assert_eq!(
            outcome,
            SaveOutcome::Persisted {
                index: 0,
                tier: "first".into()
            }
        );
        assert!(first.contains(RECORD_KEY));
        assert!(!second.contains(RECORD_KEY));
    }

    #[tokio::test]
    async fn test_save_with_no_tiers_is_memory_only() {
        let manager = StorageTierManager::new(Vec::new(), Arc::new(ManualClock::default()));

        let outcome = manager
            .save(&record_at(Timestamp::from_millis(0), Duration::from_secs(60)))
            .await;

        assert_eq!(outcome, SaveOutcome::MemoryOnly);
        assert!(manager.load().await.is_none());
    }

    #[tokio::test]
    async fn test_tier_names_in_priority_order() {
        let manager = StorageTierManager::new(
            vec![Box::new(MemoryTier::new("a")), Box::new(MemoryTier::new("b"))],
            Arc::new(ManualClock::default()),
        );
        assert_eq!(manager.tier_names(), vec!["a", "b"]);
    }
}
