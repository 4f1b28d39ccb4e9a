//! Persisted reconnection state.
//!
//! The last successfully opened connection URL is kept so a session can be
//! resumed after the host restarts. It is cleared on intentional disconnect
//! and on terminal closes.
//!
//! | Store | Backing |
//! |-------|---------|
//! | [`MemoryStore`] | Process memory |
//! | [`FileStore`] | JSON file, by default under the platform data directory |

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Directory created under the platform data directory.
const APP_DIR: &str = "inspector-session";

/// File name of the persisted connection.
const CONNECTION_FILE: &str = "connection.json";

// ============================================================================
// ConnectionStore
// ============================================================================

/// Storage for the last successful connection URL.
pub trait ConnectionStore: Send + Sync {
    /// Returns the stored URL, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn load(&self) -> Result<Option<String>>;

    /// Replaces the stored URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&self, url: &str) -> Result<()>;

    /// Removes the stored URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn clear(&self) -> Result<()>;
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory [`ConnectionStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    url: Mutex<Option<String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionStore for MemoryStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.url.lock().clone())
    }

    fn save(&self, url: &str) -> Result<()> {
        *self.url.lock() = Some(url.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.url.lock() = None;
        Ok(())
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// On-disk record.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredConnection {
    url: String,
}

/// JSON-file [`ConnectionStore`].
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store backed by `path`.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store at `<data dir>/inspector-session/connection.json`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the platform has no data directory.
    pub fn in_data_dir() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| Error::config("No platform data directory available"))?;
        Ok(Self::new(base.join(APP_DIR).join(CONNECTION_FILE)))
    }

    /// Returns the backing file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionStore for FileStore {
    fn load(&self) -> Result<Option<String>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredConnection = serde_json::from_str(&text)?;
        Ok(Some(stored.url))
    }

    fn save(&self, url: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let record = StoredConnection {
            url: url.to_string(),
        };
        fs::write(&self.path, serde_json::to_vec_pretty(&record)?)?;
        debug!(path = %self.path.display(), "Connection saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Connection cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    const URL: &str = "wss://inspect.example.com/client/v1?sessionId=s&token=t&orgId=o&clientId=c";

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.load().expect("load"), None);

        store.save(URL).expect("save");
        assert_eq!(store.load().expect("load").as_deref(), Some(URL));

        store.clear().expect("clear");
        assert_eq!(store.load().expect("load"), None);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join(CONNECTION_FILE);

        FileStore::new(&path).save(URL).expect("save");
        assert!(path.exists());

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.load().expect("load").as_deref(), Some(URL));
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::new(dir.path().join(CONNECTION_FILE));

        assert_eq!(store.load().expect("load"), None);
        store.clear().expect("clearing a missing file is fine");
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(CONNECTION_FILE);
        fs::write(&path, "not json").expect("write");

        let err = FileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
