//! Durable storage for the mailsift daemon.
//!
//! This crate provides:
//! - the [`StorageArea`] key/value abstraction with a file-backed implementation
//! - the credential and captured-contact data model
//! - [`CredentialStore`] and [`CaptureStore`], the typed APIs the rest of the
//!   daemon goes through

mod capture;
mod credentials;
mod file;
mod keys;
mod traits;
mod types;

pub use capture::{CaptureStore, SightingReport};
pub use credentials::CredentialStore;
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use traits::StorageArea;
pub use types::{CapturedContact, Credential, UserIdentity};

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// In-memory storage, used in tests across the workspace.
pub struct MemoryStorage {
    data: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageArea for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap();
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self.data.lock().unwrap();
        Ok(data.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.lock().unwrap();
        Ok(data.remove(key).is_some())
    }
}
