//! Storage trait definitions.

use crate::StorageResult;

/// Trait for durable key/value storage backends.
pub trait StorageArea: Send + Sync {
    /// Store a value. The write is atomic with respect to readers.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value. Returns whether the key existed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists.
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
