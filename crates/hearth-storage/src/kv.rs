//! The storage trait.

use crate::errors::StorageError;

/// A string key-value store with prefix enumeration.
///
/// Implementations must be safe to share across tasks; all methods take
/// `&self` and synchronize internally. Every operation is fallible so the
/// pipeline can observe a denied store and degrade, but implementations
/// should prefer returning data over erroring where possible.
pub trait KeyValueStorage: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the value under `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// List all keys starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
