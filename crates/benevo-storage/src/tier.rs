//! The storage tier abstraction and the ephemeral in-memory tier.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::StorageUnavailable;

/// One backend in the fallback chain.
///
/// The manager holds tiers as `Box<dyn StorageTier>` so a chain can mix
/// file-backed and in-memory tiers; `#[async_trait]` keeps the async
/// methods object-safe.
///
/// Every method reports backend trouble as [`StorageUnavailable`].
/// A missing key is not trouble: `read` returns `Ok(None)` and `remove`
/// returns `Ok(())`.
#[async_trait]
pub trait StorageTier: Send + Sync + 'static {
    /// Short name used in logs ("atomic-file", "memory", ...).
    fn name(&self) -> &str;

    /// Reads the raw bytes stored under `key`.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageUnavailable>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageUnavailable>;

    /// Deletes `key`. Deleting a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageUnavailable>;
}

// ---------------------------------------------------------------------------
// MemoryTier
// ---------------------------------------------------------------------------

/// Process-local storage, the last resort of the chain.
///
/// Cloning a `MemoryTier` yields a handle to the SAME map, so tests can
/// keep a handle after moving one into the manager.
///
/// Two knobs model the ways a browser-style store refuses work:
/// - a byte quota ([`MemoryTier::with_quota`])
/// - an availability switch ([`MemoryTier::set_available`])
#[derive(Clone)]
pub struct MemoryTier {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    name: String,
    entries: Mutex<HashMap<String, Vec<u8>>>,
    quota: Option<usize>,
    available: AtomicBool,
}

impl MemoryTier {
    /// An unlimited, available tier.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// A tier that refuses writes once its stored bytes would exceed `quota`.
    pub fn with_quota(name: impl Into<String>, quota: usize) -> Self {
        Self::build(name.into(), Some(quota))
    }

    fn build(name: String, quota: Option<usize>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                name,
                entries: Mutex::new(HashMap::new()),
                quota,
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Turns the tier on or off. A disabled tier fails every call.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Whether `key` currently holds a value (ignores availability).
    pub fn contains(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    /// Raw bytes under `key` (ignores availability).
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.entries().get(key).cloned()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // Nothing panics while the lock is held, so a poisoned map is still
        // consistent.
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<(), StorageUnavailable> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageUnavailable::Disabled(self.inner.name.clone()))
        }
    }
}

#[async_trait]
impl StorageTier for MemoryTier {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageUnavailable> {
        self.ensure_available()?;
        Ok(self.entries().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageUnavailable> {
        self.ensure_available()?;
        let mut entries = self.entries();

        if let Some(limit) = self.inner.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > limit {
                return Err(StorageUnavailable::QuotaExceeded {
                    tier: self.inner.name.clone(),
                    needed,
                    limit,
                });
            }
        }

        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageUnavailable> {
        self.ensure_available()?;
        self.entries().remove(key);
        Ok(())
    }
}
