//! File-backed tiers.
//!
//! - [`AtomicFileTier`] writes each key to its own file through a
//!   temporary file and a rename, so a crash mid-write leaves either the
//!   old record or the new one, never half of each.
//! - [`DocumentFileTier`] keeps every key in one JSON document and
//!   rewrites the whole document on each change.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::{StorageTier, StorageUnavailable};

/// Maps a key to a safe file stem. Keys are fixed identifiers in
/// practice, but nothing should be able to escape the tier's directory.
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// AtomicFileTier
// ---------------------------------------------------------------------------

/// Transactional tier: one file per key, replaced atomically.
#[derive(Debug, Clone)]
pub struct AtomicFileTier {
    name: String,
    dir: PathBuf,
}

impl AtomicFileTier {
    /// A tier rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::named("atomic-file", dir)
    }

    /// Same as [`AtomicFileTier::new`] with a custom log name.
    pub fn named(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    /// Where the value for `key` lives.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", file_stem(key)))
    }

    fn unavailable(&self, source: std::io::Error) -> StorageUnavailable {
        StorageUnavailable::io(&self.name, source)
    }
}

#[async_trait]
impl StorageTier for AtomicFileTier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageUnavailable> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.unavailable(e)),
        }
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageUnavailable> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.unavailable(e))?;

        let temp = self.temp_path_for(key);
        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| self.unavailable(e))?;
        file.write_all(value)
            .await
            .map_err(|e| self.unavailable(e))?;
        file.sync_all().await.map_err(|e| self.unavailable(e))?;
        drop(file);

        if let Err(e) = fs::rename(&temp, self.path_for(key)).await {
            // Leave no stray temp file behind; the old value is untouched.
            let _ = fs::remove_file(&temp).await;
            return Err(self.unavailable(e));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageUnavailable> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.unavailable(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentFileTier
// ---------------------------------------------------------------------------

/// Simple persistent tier: a single JSON object of `key → value` strings.
///
/// Values must be UTF-8 (the JSON codec always produces UTF-8).
/// A `tokio::sync::Mutex` serializes the read-modify-write cycle within
/// this process.
#[derive(Debug)]
pub struct DocumentFileTier {
    name: String,
    path: PathBuf,
    lock: Mutex<()>,
}

impl DocumentFileTier {
    /// A tier stored in the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::named("document-file", path)
    }

    /// Same as [`DocumentFileTier::new`] with a custom log name.
    pub fn named(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, source: std::io::Error) -> StorageUnavailable {
        StorageUnavailable::io(&self.name, source)
    }

    /// Loads the whole document. A missing file is an empty document.
    async fn load_document(&self) -> Result<BTreeMap<String, String>, StorageUnavailable> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.unavailable(e)),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| self.unavailable(std::io::Error::new(ErrorKind::InvalidData, e)))
    }

    async fn store_document(
        &self,
        document: &BTreeMap<String, String>,
    ) -> Result<(), StorageUnavailable> {
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| self.unavailable(std::io::Error::new(ErrorKind::InvalidData, e)))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.unavailable(e))?;
        }
        fs::write(&self.path, bytes)
            .await
            .map_err(|e| self.unavailable(e))
    }
}

#[async_trait]
impl StorageTier for DocumentFileTier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageUnavailable> {
        let _guard = self.lock.lock().await;
        let document = self.load_document().await?;
        Ok(document.get(key).map(|value| value.as_bytes().to_vec()))
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageUnavailable> {
        let text = std::str::from_utf8(value)
            .map_err(|e| self.unavailable(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        let _guard = self.lock.lock().await;
        // A corrupt document is replaced rather than blocking every write.
        let mut document = match self.load_document().await {
            Ok(document) => document,
            Err(StorageUnavailable::Io { source, .. }) if source.kind() == ErrorKind::InvalidData => {
                tracing::warn!(tier = %self.name, "document unreadable, rewriting");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        document.insert(key.to_string(), text.to_string());
        self.store_document(&document).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageUnavailable> {
        let _guard = self.lock.lock().await;
        let mut document = self.load_document().await?;
        if document.remove(key).is_some() {
            self.store_document(&document).await?;
        }
        Ok(())
    }
}
