//! Snapshot storage.
//!
//! Stores move opaque JSON strings keyed by instrument key; the schema is
//! owned by `candlesim_core::persistence`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot store lock poisoned")]
    Poisoned,
}

/// Keyed snapshot storage.
pub trait SnapshotStore: Send + Sync {
    /// Stored JSON for `key`, or `None` if nothing was saved yet.
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the JSON stored for `key`.
    fn save(&self, key: &str, json: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per instrument in a directory.
///
/// Writes go to a temporary file first and are renamed over the old one, so
/// a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    fn save(&self, key: &str, json: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        std::fs::write(&tmp, json).map_err(io_error(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io_error(&path))?;
        debug!(path = %path.display(), bytes = json.len(), "snapshot written");
        Ok(())
    }
}

/// In-process store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, json: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), json.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrip_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(root.path().join("nested").join("state"));
        assert_eq!(store.load("tradeData_BTCUSDT").unwrap(), None);

        store.save("tradeData_BTCUSDT", "{\"a\":1}").unwrap();
        store.save("tradeData_BTCUSDT", "{\"a\":2}").unwrap();
        assert_eq!(
            store.load("tradeData_BTCUSDT").unwrap().as_deref(),
            Some("{\"a\":2}")
        );
        assert!(store.path_for("tradeData_BTCUSDT").exists());
        assert!(!store.dir().join("tradeData_BTCUSDT.json.tmp").exists());
    }

    #[test]
    fn memory_store_keys_are_independent() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.save("a", "1").unwrap();
        store.save("b", "2").unwrap();
        assert_eq!(store.load("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.load("c").unwrap(), None);
        assert_eq!(store.len(), 2);
    }
}
