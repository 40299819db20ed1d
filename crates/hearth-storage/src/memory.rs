//! In-memory stores.
//!
//! [`MemoryStorage`] backs the ephemeral (per-tab) state and every test.
//! [`UnavailableStorage`] refuses all access, standing in for a browser
//! profile where client storage is denied.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::errors::StorageError;
use crate::kv::KeyValueStorage;

/// A plain in-memory key-value store. Always available.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _ = self
            .entries
            .lock()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _ = self.entries.lock().remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// A store that denies every operation.
///
/// Stands in for privacy-mode/quota-exceeded storage in degraded-path
/// tests across the workspace.
#[derive(Debug, Default)]
pub struct UnavailableStorage;

impl UnavailableStorage {
    /// Create the always-failing store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl KeyValueStorage for UnavailableStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
        Err(StorageError::Unavailable)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn set_then_get() {
        let store = MemoryStorage::new();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn get_missing_is_none() {
        let store = MemoryStorage::new();
        assert_eq!(store.get("absent").unwrap(), None);
    }

    #[test]
    fn set_replaces() {
        let store = MemoryStorage::new();
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn remove_missing_is_ok() {
        let store = MemoryStorage::new();
        store.remove("absent").unwrap();
    }

    #[test]
    fn remove_deletes() {
        let store = MemoryStorage::new();
        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn keys_with_prefix_filters() {
        let store = MemoryStorage::new();
        store.set("dedup:s1:a", "1").unwrap();
        store.set("dedup:s1:b", "1").unwrap();
        store.set("dedup:s2:a", "1").unwrap();
        store.set("session", "x").unwrap();

        let mut keys = store.keys_with_prefix("dedup:s1:").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["dedup:s1:a", "dedup:s1:b"]);
    }

    #[test]
    fn unavailable_denies_everything() {
        let store = UnavailableStorage::new();
        assert_matches!(store.get("k"), Err(StorageError::Unavailable));
        assert_matches!(store.set("k", "v"), Err(StorageError::Unavailable));
        assert_matches!(store.remove("k"), Err(StorageError::Unavailable));
        assert_matches!(
            store.keys_with_prefix(""),
            Err(StorageError::Unavailable)
        );
    }
}
