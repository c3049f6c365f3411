//! Error types for seedid
//!
//! Every failure that crosses the request boundary is one of the variants
//! below. Each carries a human-readable message only; raw error internals
//! and key material never leave the process.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Main error type for identity operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Identity already exists: {0}")]
    UserExists(String),

    #[error("Invalid seed phrase: {0}")]
    InvalidSeed(String),

    #[error("Invalid challenge: {0}")]
    InvalidChallenge(String),

    #[error("Domain mismatch: {0}")]
    DomainMismatch(String),

    #[error("Challenge expired: {0}")]
    ChallengeExpired(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

/// Wire form of an error: `{code, message}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IdentityError {
    /// Stable machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized(_) => "NOT_INITIALIZED",
            Self::UserExists(_) => "USER_EXISTS",
            Self::InvalidSeed(_) => "INVALID_SEED",
            Self::InvalidChallenge(_) => "INVALID_CHALLENGE",
            Self::DomainMismatch(_) => "DOMAIN_MISMATCH",
            Self::ChallengeExpired(_) => "CHALLENGE_EXPIRED",
            Self::Decryption(_) => "DECRYPTION_ERROR",
            Self::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::UnknownAction(_) => "UNKNOWN_ACTION",
        }
    }

    /// Human-readable message without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            Self::NotInitialized(m)
            | Self::UserExists(m)
            | Self::InvalidSeed(m)
            | Self::InvalidChallenge(m)
            | Self::DomainMismatch(m)
            | Self::ChallengeExpired(m)
            | Self::Decryption(m)
            | Self::RateLimitExceeded(m)
            | Self::Internal(m)
            | Self::UnknownAction(m) => m,
        }
    }

    /// Convert to the `{code, message}` body returned to callers
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.message().to_string(),
        }
    }
}

// Lower layers convert into the request-boundary taxonomy here. Their
// detail goes to the log; callers only see a fixed message.

/// Message returned for any storage failure
pub const STORAGE_FAILURE: &str = "Storage is unavailable";

/// Message returned when a background task dies
pub const TASK_FAILURE: &str = "Background task failed";

/// Message returned when the vault cannot be opened
pub const VAULT_FAILURE: &str = "Unable to unlock identity";

impl From<crate::vault::VaultError> for IdentityError {
    fn from(err: crate::vault::VaultError) -> Self {
        use crate::vault::VaultError;

        debug!(error = %err, "Vault operation failed");
        match err {
            VaultError::Storage(_) => Self::Internal(STORAGE_FAILURE.into()),
            VaultError::Task(_) => Self::Internal(TASK_FAILURE.into()),
            VaultError::SessionNotInitialized => Self::Decryption("No active session".into()),
            VaultError::Decryption(_) | VaultError::Encryption(_) | VaultError::Corrupt(_) => {
                Self::Decryption(VAULT_FAILURE.into())
            }
        }
    }
}

impl From<crate::storage::StorageError> for IdentityError {
    fn from(err: crate::storage::StorageError) -> Self {
        debug!(error = %err, "Storage operation failed");
        Self::Internal(STORAGE_FAILURE.into())
    }
}

impl From<tokio::task::JoinError> for IdentityError {
    fn from(err: tokio::task::JoinError) -> Self {
        debug!(error = %err, "Background task failed");
        Self::Internal(TASK_FAILURE.into())
    }
}

/// Result type alias for identity operations
pub type Result<T> = std::result::Result<T, IdentityError>;
