//! Storage key constants.

/// Storage keys used by the daemon
pub struct StorageKeys;

impl StorageKeys {
    /// Stored credential (JSON)
    pub const CREDENTIAL: &'static str = "credential";

    /// Cached authorization (entitlement) verdict
    pub const AUTHORIZED: &'static str = "authorized";

    /// Captured contacts (JSON array)
    pub const CONTACTS: &'static str = "contacts";

    /// Message of the last failed sync, cleared on success
    pub const LAST_SYNC_ERROR: &'static str = "last_sync_error";

    /// Whether captures with new contacts trigger an automatic sync
    pub const AUTO_SYNC: &'static str = "auto_sync";
}
