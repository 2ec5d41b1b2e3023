//! Typed access to the stored credential and daemon flags.

use crate::{Credential, StorageArea, StorageKeys, StorageResult};
use std::sync::Arc;

/// High-level API over a storage area for the credential and the small
/// durable flags that travel with it.
pub struct CredentialStore {
    storage: Arc<dyn StorageArea>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn StorageArea>) -> Self {
        Self { storage }
    }

    /// Read the stored credential, if any.
    pub fn credential(&self) -> StorageResult<Option<Credential>> {
        match self.storage.get(StorageKeys::CREDENTIAL)? {
            Some(json) => {
                let credential: Credential = serde_json::from_str(&json)?;
                Ok(Some(credential))
            }
            None => Ok(None),
        }
    }

    /// Replace the stored credential wholesale.
    pub fn set_credential(&self, credential: &Credential) -> StorageResult<()> {
        let json = serde_json::to_string(credential)?;
        self.storage.set(StorageKeys::CREDENTIAL, &json)
    }

    /// Remove the stored credential.
    pub fn clear_credential(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::CREDENTIAL)?;
        Ok(())
    }

    /// Whether a credential is currently stored.
    pub fn has_credential(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::CREDENTIAL)
    }

    /// Persisted authorization (entitlement) verdict. Defaults to false.
    pub fn authorized(&self) -> StorageResult<bool> {
        Ok(self
            .storage
            .get(StorageKeys::AUTHORIZED)?
            .map(|v| v == "true")
            .unwrap_or(false))
    }

    /// Persist the authorization verdict.
    pub fn set_authorized(&self, authorized: bool) -> StorageResult<()> {
        self.storage
            .set(StorageKeys::AUTHORIZED, if authorized { "true" } else { "false" })
    }

    /// Drop the persisted authorization verdict.
    pub fn clear_authorization(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::AUTHORIZED)?;
        Ok(())
    }

    /// Message of the last failed sync, if the most recent sync failed.
    pub fn last_sync_error(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::LAST_SYNC_ERROR)
    }

    pub fn set_last_sync_error(&self, message: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::LAST_SYNC_ERROR, message)
    }

    pub fn clear_last_sync_error(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::LAST_SYNC_ERROR)?;
        Ok(())
    }

    /// Whether captures that add new contacts trigger an automatic sync.
    /// Defaults to true when unset.
    pub fn auto_sync_enabled(&self) -> StorageResult<bool> {
        Ok(self
            .storage
            .get(StorageKeys::AUTO_SYNC)?
            .map(|v| v != "false")
            .unwrap_or(true))
    }

    pub fn set_auto_sync(&self, enabled: bool) -> StorageResult<()> {
        self.storage
            .set(StorageKeys::AUTO_SYNC, if enabled { "true" } else { "false" })
    }
}
