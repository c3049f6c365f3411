//! Authenticated encryption for the secret vault.
//!
//! # Algorithms
//!
//! - **Encryption**: ChaCha20-Poly1305 (authenticated, 12-byte nonce per call)
//! - **Wrapping key derivation**: PBKDF2-HMAC-SHA256 over the device key
//!   with a per-blob random salt
//!
//! Every blob is `{iv, salt, ciphertext}` with each field base64 encoded so
//! it can live in a JSON key-value store. The salt is also bound as
//! associated data, so swapping salts between blobs fails authentication.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, Payload},
    ChaCha20Poly1305, Key, KeyInit, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

// =============================================================================
// Constants
// =============================================================================

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_LEN: usize = 12;

/// Salt length for wrapping key derivation (16 bytes)
pub const SALT_LEN: usize = 16;

/// Symmetric key length (32 bytes)
pub const KEY_LEN: usize = 32;

/// ChaCha20-Poly1305 auth tag length (16 bytes)
pub const AUTH_TAG_LEN: usize = 16;

/// PBKDF2 iterations for the master secret wrapping key
pub const WRAP_KEY_ITERATIONS: u32 = 210_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("encryption failed")]
    Encrypt,

    /// Wrong key, wrong associated data or tampered ciphertext
    #[error("authentication tag mismatch")]
    Authentication,

    #[error("malformed blob field `{0}`")]
    Malformed(&'static str),
}

// =============================================================================
// Randomness + key derivation
// =============================================================================

/// Generate cryptographically secure random bytes from the OS RNG.
pub fn generate_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Derive a 256-bit wrapping key from `secret` and `salt`.
pub fn derive_wrapping_key(
    secret: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut key[..]);
    key
}

// =============================================================================
// Encryption / Decryption
// =============================================================================

/// Encrypt `plaintext` under `key`, authenticating `aad` alongside it.
///
/// Output is `plaintext.len() + AUTH_TAG_LEN` bytes.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CipherError::Encrypt)
}

/// Decrypt and authenticate. Fails closed: no partial plaintext is ever
/// returned on tag mismatch.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CipherError::Authentication)
}

// =============================================================================
// Persisted blob
// =============================================================================

/// Persisted form of an encrypted secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// Nonce (base64)
    pub iv: String,

    /// Salt (base64)
    pub salt: String,

    /// Ciphertext including auth tag (base64)
    pub ciphertext: String,
}

impl EncryptedBlob {
    pub fn new(iv: &[u8; NONCE_LEN], salt: &[u8; SALT_LEN], ciphertext: &[u8]) -> Self {
        Self {
            iv: BASE64.encode(iv),
            salt: BASE64.encode(salt),
            ciphertext: BASE64.encode(ciphertext),
        }
    }

    pub fn iv_bytes(&self) -> Result<[u8; NONCE_LEN], CipherError> {
        decode_fixed(&self.iv, "iv")
    }

    pub fn salt_bytes(&self) -> Result<[u8; SALT_LEN], CipherError> {
        decode_fixed(&self.salt, "salt")
    }

    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>, CipherError> {
        BASE64
            .decode(&self.ciphertext)
            .map_err(|_| CipherError::Malformed("ciphertext"))
    }
}

fn decode_fixed<const N: usize>(
    field: &str,
    name: &'static str,
) -> Result<[u8; N], CipherError> {
    let bytes = BASE64
        .decode(field)
        .map_err(|_| CipherError::Malformed(name))?;
    bytes.try_into().map_err(|_| CipherError::Malformed(name))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let bytes1: [u8; 16] = generate_random_bytes();
        let bytes2: [u8; 16] = generate_random_bytes();
        assert_ne!(bytes1, bytes2);
    }

    #[test]
    fn test_wrapping_key_derivation() {
        let secret = [3u8; 32];
        let salt: [u8; SALT_LEN] = generate_random_bytes();

        let key1 = derive_wrapping_key(&secret, &salt, 1_000);
        let key2 = derive_wrapping_key(&secret, &salt, 1_000);
        assert_eq!(*key1, *key2);

        let salt2: [u8; SALT_LEN] = generate_random_bytes();
        let key3 = derive_wrapping_key(&secret, &salt2, 1_000);
        assert_ne!(*key1, *key3);
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key: [u8; KEY_LEN] = generate_random_bytes();
        let nonce: [u8; NONCE_LEN] = generate_random_bytes();
        let secret = [42u8; 32];

        let ciphertext = seal(&key, &nonce, &secret, b"aad").unwrap();
        assert_eq!(ciphertext.len(), 32 + AUTH_TAG_LEN);

        let plaintext = open(&key, &nonce, &ciphertext, b"aad").unwrap();
        assert_eq!(plaintext.as_slice(), &secret);
    }

    #[test]
    fn test_open_wrong_key_fails() {
        let key: [u8; KEY_LEN] = generate_random_bytes();
        let wrong: [u8; KEY_LEN] = generate_random_bytes();
        let nonce: [u8; NONCE_LEN] = generate_random_bytes();

        let ciphertext = seal(&key, &nonce, b"secret", b"").unwrap();
        assert_eq!(
            open(&wrong, &nonce, &ciphertext, b""),
            Err(CipherError::Authentication)
        );
    }

    #[test]
    fn test_open_wrong_aad_fails() {
        let key: [u8; KEY_LEN] = generate_random_bytes();
        let nonce: [u8; NONCE_LEN] = generate_random_bytes();

        let ciphertext = seal(&key, &nonce, b"secret", b"salt-a").unwrap();
        assert!(open(&key, &nonce, &ciphertext, b"salt-b").is_err());
    }

    #[test]
    fn test_open_tampered_fails() {
        let key: [u8; KEY_LEN] = generate_random_bytes();
        let nonce: [u8; NONCE_LEN] = generate_random_bytes();

        let mut ciphertext = seal(&key, &nonce, b"secret", b"").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(open(&key, &nonce, &ciphertext, b"").is_err());
    }

    #[test]
    fn test_blob_field_decoding() {
        let iv: [u8; NONCE_LEN] = generate_random_bytes();
        let salt: [u8; SALT_LEN] = generate_random_bytes();
        let blob = EncryptedBlob::new(&iv, &salt, b"ct");

        assert_eq!(blob.iv_bytes().unwrap(), iv);
        assert_eq!(blob.salt_bytes().unwrap(), salt);
        assert_eq!(blob.ciphertext_bytes().unwrap(), b"ct");

        let bad = EncryptedBlob {
            iv: BASE64.encode([0u8; 5]),
            ..blob
        };
        assert_eq!(bad.iv_bytes(), Err(CipherError::Malformed("iv")));
    }
}
