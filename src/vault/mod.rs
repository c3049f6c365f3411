//! Layered Secret Vault
//!
//! Session key → device key → master secret. See [`service::SecretVault`].

pub mod cache;
pub mod service;
pub mod session;

pub use cache::{CacheStatsSnapshot, DeviceKeyCache};
pub use service::SecretVault;
pub use session::{SessionId, SessionKey};

use thiserror::Error;

use crate::crypto::CipherError;
use crate::storage::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("session not initialized")]
    SessionNotInitialized,

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("corrupt vault record: {0}")]
    Corrupt(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("key derivation task failed: {0}")]
    Task(String),
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;

impl From<CipherError> for VaultError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Authentication => Self::Decryption(err.to_string()),
            CipherError::Encrypt => Self::Encryption(err.to_string()),
            CipherError::Malformed(_) => Self::Corrupt(err.to_string()),
        }
    }
}

impl From<StorageError> for VaultError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
