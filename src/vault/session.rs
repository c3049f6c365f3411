//! Session Key Lifecycle
//!
//! A session key is generated in memory each time the process starts and is
//! the outermost layer of the at-rest chain. It cannot be read back out:
//! the only operations are sealing and opening, and dropping the key wipes
//! it. Anything sealed under a destroyed session key is unreadable for good.

use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::aead::{self, CipherError, KEY_LEN, NONCE_LEN};

/// Random identifier of one session (diagnostics only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sess_{}", self.0.simple())
    }
}

/// Non-exportable symmetric key bound to the lifetime of one session.
pub struct SessionKey {
    id: SessionId,
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl SessionKey {
    /// Generate a fresh random session key.
    pub fn generate() -> Self {
        let session = Self {
            id: SessionId::new(),
            key: Zeroizing::new(aead::generate_random_bytes()),
        };
        debug!(session_id = %session.id, "Generated session key");
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Encrypt under this session key with a fresh random nonce.
    pub fn seal(
        &self,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<([u8; NONCE_LEN], Vec<u8>), CipherError> {
        let nonce: [u8; NONCE_LEN] = aead::generate_random_bytes();
        let ciphertext = aead::seal(&self.key, &nonce, plaintext, aad)?;
        Ok((nonce, ciphertext))
    }

    /// Decrypt something sealed by this session key.
    pub fn open(
        &self,
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        aead::open(&self.key, nonce, ciphertext, aad)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("id", &self.id)
            .field("key", &"[NON-EXPORTABLE]")
            .finish()
    }
}
