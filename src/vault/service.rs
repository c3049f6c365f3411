//! Layered Secret Vault
//!
//! Protects the master secret at rest with a three-tier chain:
//!
//! ```text
//! session key (memory only) ──seals──▶ device key blob   (storage: deviceKey)
//! device key ──PBKDF2──▶ wrapping key ──seals──▶ master secret blob (storage: masterSecret)
//! ```
//!
//! Storage alone yields only ciphertext; a stale session key without the
//! current storage is useless. No code path writes the master secret in
//! plaintext.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crypto::aead::{self, EncryptedBlob, KEY_LEN, NONCE_LEN, SALT_LEN};
use crate::crypto::MasterSecret;
use crate::logging::audit::{self, SecurityEvent};
use crate::storage::{self, KeyValueStore, KEY_DEVICE_KEY, KEY_INITIALIZED, KEY_MASTER_SECRET};

use super::cache::{CacheStatsSnapshot, DeviceKeyCache};
use super::session::{SessionId, SessionKey};
use super::{VaultError, VaultResult};

/// Vault over an injected key-value store.
///
/// One instance per process; the session state and device-key cache live
/// here rather than in globals so several isolated vaults can coexist.
pub struct SecretVault {
    store: Arc<dyn KeyValueStore>,

    /// Current session key, `None` before `initialize_session` / after `destroy_session`
    session: RwLock<Option<SessionKey>>,

    /// Decrypted device key; the mutex also serializes create-or-load
    device_key: Mutex<DeviceKeyCache>,

    /// PBKDF2 iterations for the master secret wrapping key
    wrap_iterations: u32,
}

impl SecretVault {
    pub fn new(store: Arc<dyn KeyValueStore>, wrap_iterations: u32) -> Self {
        Self {
            store,
            session: RwLock::new(None),
            device_key: Mutex::new(DeviceKeyCache::new()),
            wrap_iterations,
        }
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Start a new session with a fresh session key.
    ///
    /// Any previous session is destroyed first.
    pub async fn initialize_session(&self) -> SessionId {
        // Lock order everywhere: device-key cache, then session.
        let mut cache = self.device_key.lock().await;
        let mut session = self.session.write().await;
        if let Some(old) = session.take() {
            cache.clear();
            audit::record(&SecurityEvent::SessionDestroyed {
                session_id: old.id().to_string(),
            });
        }

        let key = SessionKey::generate();
        let id = key.id();
        *session = Some(key);

        info!(session_id = %id, "Session initialized");
        id
    }

    pub async fn has_active_session(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn session_id(&self) -> Option<SessionId> {
        self.session.read().await.as_ref().map(SessionKey::id)
    }

    /// Discard the session key. Irrecoverable: blobs sealed under it can no
    /// longer be opened.
    pub async fn destroy_session(&self) {
        let old = self.session.write().await.take();
        self.clear_cached_device_key().await;

        if let Some(old) = old {
            audit::record(&SecurityEvent::SessionDestroyed {
                session_id: old.id().to_string(),
            });
        }
    }

    // =========================================================================
    // Device key
    // =========================================================================

    /// Load the device key, creating and persisting one on first use.
    pub async fn get_or_create_device_key(&self) -> VaultResult<Zeroizing<[u8; KEY_LEN]>> {
        let mut cache = self.device_key.lock().await;
        if let Some(key) = cache.get() {
            return Ok(key);
        }

        let session_guard = self.session.read().await;
        let session = session_guard
            .as_ref()
            .ok_or(VaultError::SessionNotInitialized)?;

        let blob: Option<EncryptedBlob> = storage::load(self.store.as_ref(), KEY_DEVICE_KEY).await?;

        let key = match blob {
            None => {
                let key = self.create_device_key(session).await?;
                debug!(session_id = %session.id(), "Created new device key");
                key
            }
            Some(blob) => {
                let key = open_device_key(session, &blob)?;
                debug!(session_id = %session.id(), "Loaded device key");
                key
            }
        };

        cache.insert(*key);
        Ok(key)
    }

    /// Replace the device key with a fresh one.
    ///
    /// Used when the persisted device key was sealed by a session that no
    /// longer exists. Any master secret blob under the old key becomes
    /// unreadable and must be saved again.
    pub async fn rotate_device_key(&self) -> VaultResult<()> {
        let mut cache = self.device_key.lock().await;
        let session_guard = self.session.read().await;
        let session = session_guard
            .as_ref()
            .ok_or(VaultError::SessionNotInitialized)?;

        let key = self.create_device_key(session).await?;
        cache.insert(*key);

        info!(session_id = %session.id(), "Device key rotated");
        Ok(())
    }

    async fn create_device_key(
        &self,
        session: &SessionKey,
    ) -> VaultResult<Zeroizing<[u8; KEY_LEN]>> {
        let key = Zeroizing::new(aead::generate_random_bytes::<KEY_LEN>());
        let salt: [u8; SALT_LEN] = aead::generate_random_bytes();

        let (iv, ciphertext) = session.seal(key.as_slice(), &salt)?;
        let blob = EncryptedBlob::new(&iv, &salt, &ciphertext);
        storage::save(self.store.as_ref(), KEY_DEVICE_KEY, &blob).await?;

        Ok(key)
    }

    /// Zero the in-memory device key copy, then drop it.
    pub async fn clear_cached_device_key(&self) {
        self.device_key.lock().await.clear();
    }

    pub async fn device_key_cache_stats(&self) -> CacheStatsSnapshot {
        self.device_key.lock().await.stats()
    }

    // =========================================================================
    // Master secret
    // =========================================================================

    /// Encrypt the master secret under the device key, persist it and set
    /// the `initialized` flag.
    pub async fn save_master_secret(&self, master: &MasterSecret) -> VaultResult<()> {
        let device_key = self.get_or_create_device_key().await?;

        let salt: [u8; SALT_LEN] = aead::generate_random_bytes();
        let iv: [u8; NONCE_LEN] = aead::generate_random_bytes();
        let wrapping_key = self.wrapping_key(device_key, salt).await?;

        let ciphertext = aead::seal(&wrapping_key, &iv, master.as_bytes(), &salt)?;
        let blob = EncryptedBlob::new(&iv, &salt, &ciphertext);

        storage::save(self.store.as_ref(), KEY_MASTER_SECRET, &blob).await?;
        storage::save(self.store.as_ref(), KEY_INITIALIZED, &true).await?;

        debug!("Master secret saved");
        Ok(())
    }

    /// Decrypt the persisted master secret.
    ///
    /// Returns `Ok(None)` when nothing is stored, or when either layer fails
    /// authentication (logged as a security event). Only a missing session or
    /// a storage failure is an error.
    pub async fn load_master_secret(&self) -> VaultResult<Option<MasterSecret>> {
        let blob: Option<EncryptedBlob> =
            storage::load(self.store.as_ref(), KEY_MASTER_SECRET).await?;
        let Some(blob) = blob else {
            return Ok(None);
        };

        let device_key = match self.get_or_create_device_key().await {
            Ok(key) => key,
            Err(VaultError::Decryption(_)) | Err(VaultError::Corrupt(_)) => {
                audit::record(&SecurityEvent::DecryptionFailed { layer: "device_key" });
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match self.open_master_secret(device_key, &blob).await {
            Ok(master) => Ok(Some(master)),
            Err(VaultError::Decryption(_)) | Err(VaultError::Corrupt(_)) => {
                audit::record(&SecurityEvent::DecryptionFailed {
                    layer: "master_secret",
                });
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn open_master_secret(
        &self,
        device_key: Zeroizing<[u8; KEY_LEN]>,
        blob: &EncryptedBlob,
    ) -> VaultResult<MasterSecret> {
        let salt = blob.salt_bytes()?;
        let iv = blob.iv_bytes()?;
        let ciphertext = blob.ciphertext_bytes()?;

        let wrapping_key = self.wrapping_key(device_key, salt).await?;
        let plaintext = aead::open(&wrapping_key, &iv, &ciphertext, &salt)?;

        MasterSecret::from_slice(&plaintext)
            .ok_or_else(|| VaultError::Corrupt("master secret has wrong length".into()))
    }

    /// Whether the persisted chain for the current session opens cleanly.
    ///
    /// `false` after a restart means the chain was sealed by a session that
    /// no longer exists.
    pub async fn chain_readable(&self) -> VaultResult<bool> {
        match self.get_or_create_device_key().await {
            Ok(_) => Ok(self.load_master_secret().await?.is_some()),
            Err(VaultError::Decryption(_)) | Err(VaultError::Corrupt(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn is_initialized(&self) -> VaultResult<bool> {
        let flag: Option<bool> = storage::load(self.store.as_ref(), KEY_INITIALIZED).await?;
        Ok(flag.unwrap_or(false))
    }

    /// PBKDF2 is deliberately slow, so it runs on the blocking pool.
    async fn wrapping_key(
        &self,
        device_key: Zeroizing<[u8; KEY_LEN]>,
        salt: [u8; SALT_LEN],
    ) -> VaultResult<Zeroizing<[u8; KEY_LEN]>> {
        let iterations = self.wrap_iterations;
        tokio::task::spawn_blocking(move || {
            aead::derive_wrapping_key(device_key.as_slice(), &salt, iterations)
        })
        .await
        .map_err(|e| VaultError::Task(e.to_string()))
    }
}

fn open_device_key(
    session: &SessionKey,
    blob: &EncryptedBlob,
) -> VaultResult<Zeroizing<[u8; KEY_LEN]>> {
    let salt = blob.salt_bytes()?;
    let iv = blob.iv_bytes()?;
    let ciphertext = blob.ciphertext_bytes()?;

    let plaintext = session.open(&iv, &ciphertext, &salt)?;
    let key: [u8; KEY_LEN] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| VaultError::Corrupt("device key has wrong length".into()))?;
    Ok(Zeroizing::new(key))
}

// =============================================================================
// Tests
// =============================================================================
