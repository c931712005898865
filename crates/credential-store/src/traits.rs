//! Storage trait definitions.

use crate::StorageResult;
use std::sync::Arc;

/// Trait for key/value storage backends.
///
/// Each call is atomic on its own; there are no cross-key transactions.
pub trait KeyValueStore: Send + Sync {
    /// Store a value under `key`, replacing any previous value
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Remove a value. Returns whether a value was present.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        (**self).remove(key)
    }
}
