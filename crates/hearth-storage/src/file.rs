//! File-backed durable storage.
//!
//! One JSON object on disk holding all keys, read once at construction and
//! written through on every mutation. The cache means reads after the
//! first never touch the filesystem; the write-through keeps the file the
//! source of truth across restarts. Files are created with 0o600 on unix
//! and parent directories are created as needed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::errors::StorageError;
use crate::kv::KeyValueStorage;

/// Durable key-value store persisted as a single JSON file.
pub struct FileStorage {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or create) the store at `path`.
    ///
    /// A missing file yields an empty store. An unreadable or malformed
    /// file is an error; callers that want to degrade instead should fall
    /// back to [`crate::MemoryStorage`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let cache = load_map(&path)?;
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the current cache to disk.
    fn save(&self, cache: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(cache)?;
        std::fs::write(&self.path, &json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&self.path, perms);
        }

        Ok(())
    }
}

/// Read the JSON map from disk. A missing file is an empty map.
fn load_map(path: &Path) -> Result<HashMap<String, String>, StorageError> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(StorageError::Io(e)),
    };

    Ok(serde_json::from_str(&data)?)
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.cache.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.lock();
        let _ = cache.insert(key.to_owned(), value.to_owned());
        self.save(&cache)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.lock();
        if cache.remove(key).is_none() {
            return Ok(());
        }
        self.save(&cache)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .cache
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("identity.json")
    }

    #[test]
    fn open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(temp_path(&dir)).unwrap();
        assert_eq!(store.get("anything").unwrap(), None);
    }

    #[test]
    fn set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(temp_path(&dir)).unwrap();
        store.set("anon_id", "abc").unwrap();
        assert_eq!(store.get("anon_id").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        {
            let store = FileStorage::open(&path).unwrap();
            store.set("anon_id", "abc").unwrap();
        }
        let store = FileStorage::open(&path).unwrap();
        assert_eq!(store.get("anon_id").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn remove_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        {
            let store = FileStorage::open(&path).unwrap();
            store.set("k", "v").unwrap();
            store.remove("k").unwrap();
        }
        let store = FileStorage::open(&path).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn remove_missing_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        let store = FileStorage::open(&path).unwrap();
        store.remove("absent").unwrap();
        assert!(!path.exists(), "no file should be created for a no-op");
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("kv.json");
        let store = FileStorage::open(&path).unwrap();
        store.set("k", "v").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        std::fs::write(&path, "not json at all").unwrap();
        assert!(FileStorage::open(&path).is_err());
    }

    #[test]
    fn keys_with_prefix_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(temp_path(&dir)).unwrap();
        store.set("flag:a", "1").unwrap();
        store.set("flag:b", "1").unwrap();
        store.set("other", "1").unwrap();

        let mut keys = store.keys_with_prefix("flag:").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["flag:a", "flag:b"]);
    }

    #[cfg(unix)]
    #[test]
    fn file_permissions_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        let store = FileStorage::open(&path).unwrap();
        store.set("k", "v").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
