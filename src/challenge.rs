//! Relying-party challenge handling.
//!
//! A challenge arrives as untyped JSON, is validated into [`Challenge`], and
//! is signed over its canonical byte form, never its wire representation.
//! Canonical form is compact JSON with keys in lexicographic order:
//!
//! ```text
//! {"action":"authenticate","domain":"example.com","expiresAt":9999999999999,"nonce":"n1","timestamp":1000}
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{IdentityError, Result};

/// Longest nonce accepted, in bytes
pub const MAX_NONCE_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeAction {
    Register,
    Authenticate,
}

/// Challenge issued by a relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Challenge {
    pub nonce: String,
    /// Issue time, Unix milliseconds
    pub timestamp: u64,
    pub domain: String,
    pub action: ChallengeAction,
    /// Unix milliseconds after which the challenge is refused
    pub expires_at: u64,
}

/// Field order here is the canonical (sorted) key order.
#[derive(Serialize)]
struct CanonicalChallenge<'a> {
    action: ChallengeAction,
    domain: &'a str,
    #[serde(rename = "expiresAt")]
    expires_at: u64,
    nonce: &'a str,
    timestamp: u64,
}

impl Challenge {
    /// Parse and structurally validate an untyped challenge.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        let challenge: Challenge = serde_json::from_value(value)
            .map_err(|e| IdentityError::InvalidChallenge(format!("Malformed challenge: {}", e)))?;
        challenge.validate()?;
        Ok(challenge)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nonce.is_empty() {
            return Err(IdentityError::InvalidChallenge("Nonce is empty".into()));
        }
        if self.nonce.len() > MAX_NONCE_LEN {
            return Err(IdentityError::InvalidChallenge(format!(
                "Nonce exceeds {} bytes",
                MAX_NONCE_LEN
            )));
        }
        if self.domain.trim().is_empty() {
            return Err(IdentityError::InvalidChallenge("Domain is empty".into()));
        }
        if self.expires_at <= self.timestamp {
            return Err(IdentityError::InvalidChallenge(
                "expiresAt must be after timestamp".into(),
            ));
        }
        Ok(())
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at
    }

    /// Deterministic byte encoding that gets signed.
    pub fn canonicalize(&self) -> Vec<u8> {
        let canonical = CanonicalChallenge {
            action: self.action,
            domain: &self.domain,
            expires_at: self.expires_at,
            nonce: &self.nonce,
            timestamp: self.timestamp,
        };
        // Plain struct of strings and integers, serialization cannot fail
        serde_json::to_vec(&canonical).unwrap_or_default()
    }
}

/// Sign the canonical form of a challenge.
pub fn sign(challenge: &Challenge, key: &SigningKey) -> Signature {
    key.sign(&challenge.canonicalize())
}

/// Sign arbitrary bytes with no canonicalization.
pub fn sign_message(message: &[u8], key: &SigningKey) -> Signature {
    key.sign(message)
}

/// Relying-party side check of a challenge signature.
pub fn verify(challenge: &Challenge, signature: &Signature, public_key: &VerifyingKey) -> bool {
    public_key
        .verify_strict(&challenge.canonicalize(), signature)
        .is_ok()
}

/// [`verify`] over the base64 strings returned by `sign_challenge`.
pub fn verify_base64(challenge: &Challenge, signature: &str, public_key: &str) -> Result<bool> {
    let sig_bytes = BASE64
        .decode(signature)
        .map_err(|e| IdentityError::InvalidChallenge(format!("Bad signature encoding: {}", e)))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| IdentityError::InvalidChallenge(format!("Bad signature: {}", e)))?;

    let key_bytes: [u8; 32] = BASE64
        .decode(public_key)
        .map_err(|e| IdentityError::InvalidChallenge(format!("Bad public key encoding: {}", e)))?
        .try_into()
        .map_err(|_| IdentityError::InvalidChallenge("Public key must be 32 bytes".into()))?;
    let public_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| IdentityError::InvalidChallenge(format!("Bad public key: {}", e)))?;

    Ok(verify(challenge, &signature, &public_key))
}
