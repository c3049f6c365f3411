//! Security audit events
//!
//! Replays, domain mismatches, rate-limit hits and vault failures are logged
//! on the `seedid::audit` target so they can be routed separately from
//! ordinary diagnostics. Events never carry secrets; nonces are reduced to a
//! short SHA-256 fingerprint.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Audit event types
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SecurityEvent {
    /// A challenge nonce was presented a second time
    ReplayDetected { domain: String, nonce_fp: String },

    /// Request origin did not match the domain inside the challenge
    DomainMismatch {
        request_domain: String,
        challenge_domain: String,
    },

    /// A domain exceeded its signing budget for the current window
    RateLimitExceeded { domain: String, count: u32 },

    /// A vault layer failed authentication
    DecryptionFailed { layer: &'static str },

    /// A session key was discarded
    SessionDestroyed { session_id: String },

    /// All identity material was wiped
    VaultReset,
}

impl SecurityEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReplayDetected { .. } => "replay_detected",
            Self::DomainMismatch { .. } => "domain_mismatch",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::DecryptionFailed { .. } => "decryption_failed",
            Self::SessionDestroyed { .. } => "session_destroyed",
            Self::VaultReset => "vault_reset",
        }
    }

    /// Lifecycle events are informational, the rest are warnings.
    pub fn is_warning(&self) -> bool {
        !matches!(self, Self::SessionDestroyed { .. } | Self::VaultReset)
    }

    /// Convert to a JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Emit an audit event.
pub fn record(event: &SecurityEvent) {
    let details = event.to_jsonl().unwrap_or_default();
    if event.is_warning() {
        warn!(target: "seedid::audit", event = event.name(), %details, "Security event");
    } else {
        info!(target: "seedid::audit", event = event.name(), %details, "Security event");
    }
}

/// Short, non-reversible fingerprint of a nonce for logs.
pub fn fingerprint(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..8])
}
