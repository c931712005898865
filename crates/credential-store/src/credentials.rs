//! Typed credential persistence on top of a [`KeyValueStore`].

use crate::{KeyValueStore, StorageError, StorageKeys, StorageResult, StoredCredentials};
use crate::models::{TokenPair, UserProfile};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Durable copy of the signed-in user's profile and token pair.
pub struct CredentialStore {
    storage: Box<dyn KeyValueStore>,
}

impl CredentialStore {
    /// Create a credential store over the given backend
    pub fn new(storage: Box<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    // ==========================================
    // Writes
    // ==========================================

    /// Persist profile then token pair. The two writes are independent, so a
    /// failure on the second leaves the profile behind.
    pub fn save(&self, profile: &UserProfile, tokens: &TokenPair) -> StorageResult<()> {
        self.save_profile(profile)?;
        self.save_tokens(tokens)
    }

    /// Persist only the profile
    pub fn save_profile(&self, profile: &UserProfile) -> StorageResult<()> {
        self.write_json(StorageKeys::USER_PROFILE, profile)
    }

    /// Persist only the token pair
    pub fn save_tokens(&self, tokens: &TokenPair) -> StorageResult<()> {
        self.write_json(StorageKeys::AUTH_TOKEN, tokens)
    }

    /// Remove both entries. Both removals are attempted; the first error wins.
    pub fn clear(&self) -> StorageResult<()> {
        let mut first_error = None;
        for key in StorageKeys::ALL {
            match self.storage.remove(key) {
                Ok(removed) => debug!(key, removed, "Cleared credential entry"),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ==========================================
    // Reads
    // ==========================================

    pub fn load_profile(&self) -> StorageResult<Option<UserProfile>> {
        self.read_json(StorageKeys::USER_PROFILE)
    }

    pub fn load_tokens(&self) -> StorageResult<Option<TokenPair>> {
        self.read_json(StorageKeys::AUTH_TOKEN)
    }

    /// Read both entries.
    pub fn load(&self) -> StorageResult<StoredCredentials> {
        Ok(StoredCredentials {
            profile: self.load_profile()?,
            tokens: self.load_tokens()?,
        })
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(key, &bytes)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.storage.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Encoding(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }
}
