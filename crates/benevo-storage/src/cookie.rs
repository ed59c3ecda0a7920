//! The "is connected" flag.
//!
//! Restoring the full record means touching every tier, which takes a
//! few awaits. Route guards sometimes need an answer before that: the
//! cookie is a single boolean they can read synchronously. It carries no
//! tokens, so it is safe to keep in a plain file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// A synchronous, non-sensitive connection flag.
#[derive(Debug)]
pub struct ConnectionCookie {
    value: AtomicBool,
    path: Option<PathBuf>,
}

impl ConnectionCookie {
    /// A flag that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            value: AtomicBool::new(false),
            path: None,
        }
    }

    /// A flag mirrored to `path`, initialised from the file if it exists.
    ///
    /// Uses blocking `std::fs` on purpose: the file holds one byte and the
    /// whole point of the cookie is a synchronous answer.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = match std::fs::read(&path) {
            Ok(bytes) => bytes.first() == Some(&b'1'),
            Err(_) => false,
        };
        Self {
            value: AtomicBool::new(initial),
            path: Some(path),
        }
    }

    /// The last value written.
    pub fn is_connected(&self) -> bool {
        self.value.load(Ordering::SeqCst)
    }

    /// Updates the flag. Persisting is best effort.
    pub fn set(&self, connected: bool) {
        self.value.store(connected, Ordering::SeqCst);

        let Some(path) = &self.path else {
            return;
        };
        let byte: &[u8] = if connected { b"1" } else { b"0" };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(path, byte) {
            tracing::warn!(path = %path.display(), error = %e, "could not persist connection cookie");
        }
    }
}

impl Default for ConnectionCookie {
    fn default() -> Self {
        Self::in_memory()
    }
}
