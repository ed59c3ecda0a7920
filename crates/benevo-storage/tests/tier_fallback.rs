//! Integration tests for the tier fallback chain.
//!
//! A scripted tier stands in for a backend that is "structurally there"
//! but throws at the call (quota, disabled storage), so every fallthrough
//! path can be exercised without touching real quotas.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use benevo_storage::{
    AtomicFileTier, DocumentFileTier, MemoryTier, SaveOutcome, StorageTier, StorageTierManager,
    StorageUnavailable, RECORD_KEY,
};
use benevo_types::{Clock, Codec, JsonCodec, ManualClock, SessionRecord, Timestamp, UserId};

// =========================================================================
// Helpers
// =========================================================================

const TTL: Duration = Duration::from_secs(3600);

/// A tier whose writes (and optionally reads) throw, counting calls.
#[derive(Clone, Default)]
struct ThrowingTier {
    fail_reads: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    removes: Arc<AtomicUsize>,
}

#[async_trait]
impl StorageTier for ThrowingTier {
    fn name(&self) -> &str {
        "throwing"
    }

    async fn read(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageUnavailable> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(StorageUnavailable::Disabled("throwing".into()))
        } else {
            Ok(None)
        }
    }

    async fn write(&self, _key: &str, value: &[u8]) -> Result<(), StorageUnavailable> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StorageUnavailable::QuotaExceeded {
            tier: "throwing".into(),
            needed: value.len(),
            limit: 0,
        })
    }

    async fn remove(&self, _key: &str) -> Result<(), StorageUnavailable> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        Err(StorageUnavailable::Disabled("throwing".into()))
    }
}

fn clock() -> ManualClock {
    ManualClock::new(Timestamp::from_secs(1_700_000_000))
}

fn record(clock: &ManualClock) -> SessionRecord {
    SessionRecord::new("access", "refresh", UserId::new("u-42"), clock.now(), TTL)
}

fn encoded(record: &SessionRecord) -> Vec<u8> {
    JsonCodec.encode(record).unwrap()
}

static NEXT_DIR: AtomicU32 = AtomicU32::new(0);

fn scratch_dir(label: &str) -> PathBuf {
    let n = NEXT_DIR.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "benevo-fallback-{label}-{}-{n}",
        std::process::id()
    ))
}

// =========================================================================
// Tier fallback on write
// =========================================================================

#[tokio::test]
async fn test_save_first_tier_throws_second_tier_accepts() {
    let clock = clock();
    let broken = ThrowingTier::default();
    let backup = MemoryTier::new("backup");
    let manager = StorageTierManager::new(
        vec![Box::new(broken.clone()), Box::new(backup.clone())],
        Arc::new(clock.clone()),
    );
    let saved = record(&clock);

    let outcome = manager.save(&saved).await;

    assert_eq!(
        outcome,
        SaveOutcome::Persisted {
            index: 1,
            tier: "backup".into()
        }
    );
    assert_eq!(broken.writes.load(Ordering::SeqCst), 1);

    let (index, loaded) = manager.locate().await.expect("record should load");
    assert_eq!(index, 1);
    assert_eq!(loaded, saved);
}

#[tokio::test]
async fn test_save_first_tier_unreadable_still_loads_from_second() {
    let clock = clock();
    let broken = ThrowingTier::default();
    broken.fail_reads.store(true, Ordering::SeqCst);
    let manager = StorageTierManager::new(
        vec![Box::new(broken), Box::new(MemoryTier::new("backup"))],
        Arc::new(clock.clone()),
    );

    manager.save(&record(&clock)).await;

    assert!(manager.load().await.is_some());
}

#[tokio::test]
async fn test_save_does_not_touch_lower_tiers_when_first_accepts() {
    let clock = clock();
    let lower = ThrowingTier::default();
    let manager = StorageTierManager::new(
        vec![Box::new(MemoryTier::new("primary")), Box::new(lower.clone())],
        Arc::new(clock.clone()),
    );

    let outcome = manager.save(&record(&clock)).await;

    assert!(outcome.is_persisted());
    assert_eq!(lower.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_save_every_tier_throws_is_memory_only_not_an_error() {
    let clock = clock();
    let quota = MemoryTier::with_quota("tiny", 8);
    let disabled = MemoryTier::new("off");
    disabled.set_available(false);
    let manager = StorageTierManager::new(
        vec![
            Box::new(ThrowingTier::default()),
            Box::new(quota.clone()),
            Box::new(disabled),
        ],
        Arc::new(clock.clone()),
    );

    let outcome = manager.save(&record(&clock)).await;

    assert_eq!(outcome, SaveOutcome::MemoryOnly);
    assert!(quota.is_empty());
}

// =========================================================================
// Expiry on read
// =========================================================================

#[tokio::test]
async fn test_load_expired_record_returns_none_and_clears_tier() {
    let clock = clock();
    let tier = MemoryTier::new("only");
    let stale = record(&clock);
    tier.write(RECORD_KEY, &encoded(&stale)).await.unwrap();
    let manager = StorageTierManager::new(vec![Box::new(tier.clone())], Arc::new(clock.clone()));

    clock.advance(TTL);

    assert!(manager.load().await.is_none());
    assert!(!tier.contains(RECORD_KEY));
}

#[tokio::test]
async fn test_load_expired_in_second_tier_only_clears_second_tier() {
    // Record with expires_at = now - 1s, present only in tier 2.
    let clock = clock();
    let first = MemoryTier::new("first");
    let second = MemoryTier::new("second");
    let stale = record(&clock);
    second.write(RECORD_KEY, &encoded(&stale)).await.unwrap();
    clock.advance(TTL + Duration::from_secs(1));
    let manager = StorageTierManager::new(
        vec![Box::new(first.clone()), Box::new(second.clone())],
        Arc::new(clock.clone()),
    );

    assert!(manager.load().await.is_none());
    assert!(!second.contains(RECORD_KEY));
    assert!(first.is_empty());
}

#[tokio::test]
async fn test_load_skips_expired_tier_and_returns_next_valid() {
    let clock = clock();
    let first = MemoryTier::new("first");
    let second = MemoryTier::new("second");
    let old = SessionRecord::new("old", "old", UserId::new("u-1"), clock.now(), Duration::from_secs(1));
    first.write(RECORD_KEY, &encoded(&old)).await.unwrap();
    clock.advance(Duration::from_secs(5));
    let fresh = record(&clock);
    second.write(RECORD_KEY, &encoded(&fresh)).await.unwrap();
    let manager = StorageTierManager::new(
        vec![Box::new(first.clone()), Box::new(second)],
        Arc::new(clock.clone()),
    );

    let loaded = manager.load().await.expect("second tier is valid");

    assert_eq!(loaded.access_token, "access");
    assert!(!first.contains(RECORD_KEY));
}

#[tokio::test]
async fn test_load_corrupt_record_is_cleared_and_skipped() {
    let clock = clock();
    let first = MemoryTier::new("first");
    first.write(RECORD_KEY, b"{\"half\":").await.unwrap();
    let manager = StorageTierManager::new(vec![Box::new(first.clone())], Arc::new(clock.clone()));

    assert!(manager.load().await.is_none());
    assert!(!first.contains(RECORD_KEY));
}

// =========================================================================
// Clear
// =========================================================================

#[tokio::test]
async fn test_clear_reaches_every_tier_despite_failures() {
    let clock = clock();
    let broken = ThrowingTier::default();
    let a = MemoryTier::new("a");
    let b = MemoryTier::new("b");
    a.write(RECORD_KEY, b"x").await.unwrap();
    b.write(RECORD_KEY, b"y").await.unwrap();
    let manager = StorageTierManager::new(
        vec![Box::new(a.clone()), Box::new(broken.clone()), Box::new(b.clone())],
        Arc::new(clock),
    );

    manager.clear().await;

    assert!(!a.contains(RECORD_KEY));
    assert!(!b.contains(RECORD_KEY));
    assert_eq!(broken.removes.load(Ordering::SeqCst), 1);
}

// =========================================================================
// Real file chain
// =========================================================================

#[tokio::test]
async fn test_file_chain_survives_manager_restart() {
    let clock = clock();
    let dir = scratch_dir("restart");
    let build = |clock: &ManualClock| {
        StorageTierManager::new(
            vec![
                Box::new(AtomicFileTier::new(dir.join("atomic"))),
                Box::new(DocumentFileTier::new(dir.join("document.json"))),
                Box::new(MemoryTier::new("memory")),
            ],
            Arc::new(clock.clone()),
        )
    };
    let saved = record(&clock);

    let outcome = build(&clock).save(&saved).await;
    assert_eq!(outcome, SaveOutcome::Persisted { index: 0, tier: "atomic-file".into() });

    // A brand new manager (a "reload") sees the same record.
    let reloaded = build(&clock).load().await.expect("record on disk");
    assert_eq!(reloaded, saved);
}

#[tokio::test]
async fn test_file_chain_falls_back_to_document_when_atomic_dir_blocked() {
    let clock = clock();
    let dir = scratch_dir("blocked");
    std::fs::create_dir_all(&dir).unwrap();
    // A regular file where the atomic tier wants its directory.
    std::fs::write(dir.join("atomic"), b"").unwrap();
    let manager = StorageTierManager::new(
        vec![
            Box::new(AtomicFileTier::new(dir.join("atomic"))),
            Box::new(DocumentFileTier::new(dir.join("document.json"))),
        ],
        Arc::new(clock.clone()),
    );

    let outcome = manager.save(&record(&clock)).await;

    assert_eq!(outcome, SaveOutcome::Persisted { index: 1, tier: "document-file".into() });
    assert!(manager.load().await.is_some());
}
