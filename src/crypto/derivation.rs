//! Deterministic key derivation.
//!
//! ```text
//! phrase ──NFKD──▶ PBKDF2-HMAC-SHA512 (210k, fixed salt) ──▶ master secret (32 B)
//!
//! domain ──normalize──▶ SHA-256 ──▶ salt
//! HKDF-SHA256(salt, master secret, SITE_KEY_INFO) ──▶ Ed25519 seed ──▶ site keypair
//! ```
//!
//! Determinism is the recovery mechanism: the same phrase must yield the
//! same site keys forever, so none of the constants below may change
//! without a new version tag.

use ed25519_dalek::{SigningKey, VerifyingKey};
use hkdf::Hkdf;
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256, Sha512};
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, Zeroizing};

use crate::domain::normalize;
use crate::types::{IdentityError, Result};

use super::mnemonic::SeedPhrase;

/// PBKDF2 iteration count for master secret derivation
pub const MASTER_SECRET_ITERATIONS: u32 = 210_000;

/// Fixed application salt for master secret derivation
pub const MASTER_SECRET_SALT: &[u8] = b"seedid:master-secret:v1";

/// HKDF info label for site key derivation
pub const SITE_KEY_INFO: &[u8] = b"seedid:site-key:ed25519:v1";

/// Master secret length (256 bits)
pub const MASTER_SECRET_LEN: usize = 32;

// =============================================================================
// Master Secret
// =============================================================================

/// Root secret of every site identity.
///
/// Zeroized on drop; `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterSecret(Zeroizing<[u8; MASTER_SECRET_LEN]>);

impl MasterSecret {
    pub fn from_bytes(bytes: [u8; MASTER_SECRET_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Build from a decrypted buffer, rejecting anything but 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; MASTER_SECRET_LEN] = bytes.try_into().ok()?;
        Some(Self::from_bytes(arr))
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_SECRET_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterSecret([REDACTED])")
    }
}

/// Derive the master secret from a recovery phrase.
///
/// The phrase is NFKD-normalized first. `iterations` is
/// [`MASTER_SECRET_ITERATIONS`] in production; the cost is the
/// brute-force protection of the phrase.
pub fn derive_master_secret(phrase: &SeedPhrase, iterations: u32) -> MasterSecret {
    let normalized: Zeroizing<String> = Zeroizing::new(phrase.as_str().nfkd().collect());

    let mut out = [0u8; MASTER_SECRET_LEN];
    pbkdf2_hmac::<Sha512>(
        normalized.as_bytes(),
        MASTER_SECRET_SALT,
        iterations,
        &mut out,
    );

    let secret = MasterSecret::from_bytes(out);
    out.zeroize();
    secret
}

// =============================================================================
// Site Keys
// =============================================================================

/// Per-domain Ed25519 keypair.
///
/// Recomputed on demand and never persisted. `SigningKey` zeroizes itself
/// on drop.
#[derive(Clone)]
pub struct SiteKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl SiteKeyPair {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }
}

impl std::fmt::Debug for SiteKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteKeyPair")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// SHA-256 of the normalized domain, used as the HKDF salt.
pub fn domain_salt(domain: &str) -> [u8; 32] {
    Sha256::digest(normalize(domain).as_bytes()).into()
}

/// Derive the keypair a given site sees.
pub fn derive_site_key(master: &MasterSecret, domain: &str) -> Result<SiteKeyPair> {
    let salt = domain_salt(domain);
    let hkdf = Hkdf::<Sha256>::new(Some(&salt), master.as_bytes());

    let mut seed = Zeroizing::new([0u8; 32]);
    hkdf.expand(SITE_KEY_INFO, &mut seed[..])
        .map_err(|_| IdentityError::Decryption("Site key expansion failed".into()))?;

    Ok(SiteKeyPair::from_seed(&seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const TEST_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn phrase() -> SeedPhrase {
        SeedPhrase::parse(TEST_PHRASE).unwrap()
    }

    #[test]
    fn test_master_secret_deterministic_at_production_cost() {
        let a = derive_master_secret(&phrase(), MASTER_SECRET_ITERATIONS);
        let b = derive_master_secret(&phrase(), MASTER_SECRET_ITERATIONS);
        assert_eq!(a, b);
        assert_ne!(a.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_iterations_change_the_secret() {
        let a = derive_master_secret(&phrase(), 1_000);
        let b = derive_master_secret(&phrase(), 1_001);
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_phrases_differ() {
        let other = super::super::mnemonic::generate().unwrap();
        let a = derive_master_secret(&phrase(), 1_000);
        let b = derive_master_secret(&other, 1_000);
        assert_ne!(a, b);
    }

    #[test]
    fn test_site_key_deterministic() {
        let master = derive_master_secret(&phrase(), 1_000);
        let k1 = derive_site_key(&master, "example.com").unwrap();
        let k2 = derive_site_key(&master, "example.com").unwrap();
        assert_eq!(k1.public_key_bytes(), k2.public_key_bytes());
        assert_eq!(k1.signing_key().to_bytes(), k2.signing_key().to_bytes());
    }

    #[test]
    fn test_site_key_uses_normalized_domain() {
        let master = MasterSecret::from_bytes([7u8; 32]);
        let bare = derive_site_key(&master, "example.com").unwrap();
        let url = derive_site_key(&master, "https://www.Example.com/path").unwrap();
        assert_eq!(bare.public_key_bytes(), url.public_key_bytes());
    }

    #[test]
    fn test_site_keys_isolated_across_domains() {
        let master = MasterSecret::from_bytes([7u8; 32]);
        let mut seen = HashSet::new();
        for i in 0..500 {
            let key = derive_site_key(&master, &format!("site-{}.example", i)).unwrap();
            assert!(seen.insert(key.public_key_bytes()), "collision at {}", i);
        }
    }

    #[test]
    fn test_site_keys_isolated_across_masters() {
        let a = derive_site_key(&MasterSecret::from_bytes([1u8; 32]), "bank.com").unwrap();
        let b = derive_site_key(&MasterSecret::from_bytes([2u8; 32]), "bank.com").unwrap();
        assert_ne!(a.public_key_bytes(), b.public_key_bytes());
    }

    #[test]
    fn test_master_secret_from_slice_checks_length() {
        assert!(MasterSecret::from_slice(&[0u8; 31]).is_none());
        assert!(MasterSecret::from_slice(&[0u8; 32]).is_some());
    }

    #[test]
    fn test_debug_redacts() {
        let master = MasterSecret::from_bytes([9u8; 32]);
        assert_eq!(format!("{:?}", master), "MasterSecret([REDACTED])");
    }
}
