//! The local captured-contact collection.

use crate::types::normalize_address;
use crate::{CapturedContact, StorageArea, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Result of recording a batch of sightings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SightingReport {
    /// Contacts stored after the merge.
    pub total_stored: usize,
    /// Contacts that did not exist before this batch.
    pub newly_added: usize,
}

/// Store for captured contacts, keyed by normalized address.
///
/// Every mutation is a read-modify-write of the whole collection, serialized
/// by a per-instance mutex so concurrent captures cannot lose each other's
/// sightings.
pub struct CaptureStore {
    storage: Arc<dyn StorageArea>,
    write_lock: Mutex<()>,
}

impl CaptureStore {
    pub fn new(storage: Arc<dyn StorageArea>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Record sightings of `addresses` on `source_url` at `observed_at`.
    ///
    /// Addresses are normalized before lookup; entries without a `@` are
    /// skipped. Repeat sightings merge (earliest first-seen, latest
    /// last-seen, URL union) rather than overwrite.
    pub fn record_sightings<I, S>(
        &self,
        addresses: I,
        source_url: &str,
        observed_at: DateTime<Utc>,
    ) -> StorageResult<SightingReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let _guard = self.write_lock.lock().unwrap();
        let mut contacts = self.load()?;
        let mut newly_added = 0usize;

        for raw in addresses {
            let email = normalize_address(raw.as_ref());
            let Some((_, domain)) = email.split_once('@') else {
                debug!(address = %email, "skipping address without a domain");
                continue;
            };
            if domain.is_empty() {
                continue;
            }

            match contacts.iter_mut().find(|c| c.email == email) {
                Some(existing) => existing.merge_sighting(source_url, observed_at),
                None => {
                    contacts.push(CapturedContact {
                        domain: domain.to_string(),
                        email,
                        source_urls: vec![source_url.to_string()],
                        first_seen_at: observed_at,
                        last_seen_at: observed_at,
                    });
                    newly_added += 1;
                }
            }
        }

        if newly_added > 0 || !contacts.is_empty() {
            self.persist(&contacts)?;
        }

        Ok(SightingReport {
            total_stored: contacts.len(),
            newly_added,
        })
    }

    /// Merge records fetched from the remote store into the local collection.
    /// Returns how many records were new locally.
    pub fn merge_remote(&self, remote: &[CapturedContact]) -> StorageResult<usize> {
        let _guard = self.write_lock.lock().unwrap();
        let mut contacts = self.load()?;
        let mut newly_added = 0usize;

        for record in remote {
            let email = normalize_address(&record.email);
            match contacts.iter_mut().find(|c| c.email == email) {
                Some(existing) => existing.merge_record(record),
                None => {
                    let mut owned = record.clone();
                    owned.email = email;
                    contacts.push(owned);
                    newly_added += 1;
                }
            }
        }

        self.persist(&contacts)?;
        Ok(newly_added)
    }

    /// Current contents of the collection.
    pub fn snapshot(&self) -> StorageResult<Vec<CapturedContact>> {
        let _guard = self.write_lock.lock().unwrap();
        self.load()
    }

    /// Number of stored contacts.
    pub fn count(&self) -> StorageResult<usize> {
        Ok(self.snapshot()?.len())
    }

    /// Destroy the whole collection. The only way contacts are removed.
    pub fn clear_all(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock().unwrap();
        self.storage.delete(StorageKeys::CONTACTS)?;
        Ok(())
    }

    fn load(&self) -> StorageResult<Vec<CapturedContact>> {
        match self.storage.get(StorageKeys::CONTACTS)? {
            Some(json) => {
                let contacts: Vec<CapturedContact> = serde_json::from_str(&json)?;
                Ok(contacts)
            }
            None => Ok(Vec::new()),
        }
    }

    fn persist(&self, contacts: &[CapturedContact]) -> StorageResult<()> {
        let json = serde_json::to_string(contacts)?;
        self.storage.set(StorageKeys::CONTACTS, &json)
    }
}
