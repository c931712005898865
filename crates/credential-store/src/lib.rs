//! Durable credential storage for the gym client.
//!
//! Two layers:
//! - [`KeyValueStore`]: the byte-level primitive (`get`/`set`/`remove`), with
//!   a process-local [`MemoryStorage`] and a directory-backed [`FileStorage`].
//! - [`CredentialStore`]: typed save/load/clear of the user profile and token
//!   pair, serialized as JSON under fixed [`StorageKeys`].

mod credentials;
mod file;
mod keys;
mod memory;
mod models;
mod traits;

pub use credentials::CredentialStore;
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use models::{StoredCredentials, TokenPair, UserProfile};
pub use traits::KeyValueStore;

use std::path::PathBuf;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend could not be reached, read or written
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Stored bytes could not be encoded/decoded
    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a credential store backed by files under `dir`.
pub fn create_file_store(dir: impl Into<PathBuf>) -> StorageResult<CredentialStore> {
    let storage = FileStorage::new(dir)?;
    Ok(CredentialStore::new(Box::new(storage)))
}
