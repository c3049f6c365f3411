//! Identity Service
//!
//! The context object behind every request: owns the vault, the abuse
//! guards and the temporary seed slot, and runs the signing pipeline.
//!
//! Challenge signing checks, cheapest first:
//!
//! 1. identity initialized and session active
//! 2. per-domain rate limit
//! 3. challenge structure
//! 4. nonce not previously consumed
//! 5. request domain equals challenge domain
//! 6. challenge not expired
//! 7. unlock master secret, derive site key, sign

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::challenge::{self, Challenge};
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::crypto::{derive_master_secret, derive_site_key, mnemonic, MasterSecret, SeedPhrase, SiteKeyPair};
use crate::domain;
use crate::guard::{RateLimiter, ReplayGuard};
use crate::logging::audit::{self, fingerprint, SecurityEvent};
use crate::storage::{self, KeyValueStore, ALL_KEYS, KEY_CREATED_AT};
use crate::types::{IdentityError, Result};
use crate::vault::{SecretVault, VaultError};

use super::seed_slot::SeedSlot;

/// Snapshot returned by `get_state`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityState {
    pub initialized: bool,
    pub seed_phrase_available: bool,
    /// Unix milliseconds
    pub created_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedPhraseResponse {
    pub seed_phrase: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    /// Base64 Ed25519 public key
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureResponse {
    /// Base64 Ed25519 signature
    pub signature: String,
    pub public_key: String,
}

impl SignatureResponse {
    fn new(signature: ed25519_dalek::Signature, keys: &SiteKeyPair) -> Self {
        Self {
            signature: BASE64.encode(signature.to_bytes()),
            public_key: BASE64.encode(keys.public_key_bytes()),
        }
    }
}

pub struct IdentityService {
    store: Arc<dyn KeyValueStore>,
    vault: SecretVault,
    replay: ReplayGuard,
    limiter: RateLimiter,
    seed: SeedSlot,
    clock: Arc<dyn Clock>,
    config: CoreConfig,
}

impl IdentityService {
    /// Build a service on the system clock and open its session.
    pub async fn start(store: Arc<dyn KeyValueStore>, config: CoreConfig) -> Self {
        Self::start_with_clock(store, Arc::new(SystemClock), config).await
    }

    pub async fn start_with_clock(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: CoreConfig,
    ) -> Self {
        let service = Self {
            vault: SecretVault::new(store.clone(), config.kdf_iterations),
            replay: ReplayGuard::new(store.clone(), clock.clone(), config.replay),
            limiter: RateLimiter::new(config.rate_limit, clock.clone()),
            seed: SeedSlot::new(config.seed_display),
            store,
            clock,
            config,
        };
        service.vault.initialize_session().await;
        service
    }

    pub fn vault(&self) -> &SecretVault {
        &self.vault
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub async fn get_state(&self) -> Result<IdentityState> {
        let initialized = self.vault.is_initialized().await?;
        let created_at: Option<u64> = storage::load(self.store.as_ref(), KEY_CREATED_AT).await?;

        Ok(IdentityState {
            initialized,
            seed_phrase_available: self.seed.has_phrase(),
            created_at,
        })
    }

    /// Create a new identity (`None`) or restore one from a phrase.
    ///
    /// A created identity is parked until `confirm_seed_backup`; a restored
    /// one is persisted immediately.
    pub async fn initialize(&self, seed_phrase: Option<String>) -> Result<SeedPhraseResponse> {
        match seed_phrase {
            None => self.create().await,
            Some(phrase) => self.restore(&phrase).await,
        }
    }

    async fn create(&self) -> Result<SeedPhraseResponse> {
        if self.vault.is_initialized().await? {
            return Err(IdentityError::UserExists(
                "An identity already exists on this device".into(),
            ));
        }

        let phrase = mnemonic::generate()?;
        let (phrase, master) = self.derive_master(phrase).await?;
        let response = SeedPhraseResponse {
            seed_phrase: phrase.as_str().to_string(),
        };

        self.seed.set(phrase, Some(master));
        info!("New identity created, awaiting backup confirmation");
        Ok(response)
    }

    async fn restore(&self, input: &str) -> Result<SeedPhraseResponse> {
        let phrase = SeedPhrase::parse(input)?;

        if self.vault.is_initialized().await? && self.vault.chain_readable().await? {
            return Err(IdentityError::UserExists(
                "An identity already exists on this device".into(),
            ));
        }

        let (phrase, master) = self.derive_master(phrase).await?;
        self.persist_master(&master).await?;
        self.stamp_created_at().await?;

        // A restore supersedes any unconfirmed create
        self.seed.cancel();

        info!("Identity restored from seed phrase");
        Ok(SeedPhraseResponse {
            seed_phrase: phrase.as_str().to_string(),
        })
    }

    /// Persist a created identity and restart the phrase display window.
    pub async fn confirm_seed_backup(&self) -> Result<()> {
        match self.seed.pending() {
            Some(master) => {
                self.persist_master(&master).await?;
                self.stamp_created_at().await?;
                self.seed.take_pending();
                self.seed.rearm();
                info!("Seed backup confirmed, identity initialized");
                Ok(())
            }
            None if self.vault.is_initialized().await? => {
                self.seed.rearm();
                Ok(())
            }
            None => Err(IdentityError::NotInitialized(
                "No identity is awaiting backup confirmation".into(),
            )),
        }
    }

    pub fn get_seed_phrase(&self) -> Result<SeedPhraseResponse> {
        self.seed
            .phrase()
            .map(|seed_phrase| SeedPhraseResponse { seed_phrase })
            .ok_or_else(|| IdentityError::NotInitialized("Seed phrase is no longer available".into()))
    }

    /// End the session: the seed slot is cancelled first, then the session
    /// key and cached device key are discarded.
    pub async fn destroy_session(&self) {
        self.seed.cancel();
        self.vault.destroy_session().await;
    }

    /// Wipe everything and start over with a fresh session.
    pub async fn reset(&self) -> Result<()> {
        self.destroy_session().await;
        self.limiter.clear();

        for key in ALL_KEYS {
            self.store.remove(key).await?;
        }
        audit::record(&SecurityEvent::VaultReset);

        self.vault.initialize_session().await;
        Ok(())
    }

    // =========================================================================
    // Site identities
    // =========================================================================

    pub async fn get_public_key(&self, request_domain: &str) -> Result<PublicKeyResponse> {
        self.ensure_ready().await?;
        let domain = request_domain_of(request_domain)?;

        let keys = self.site_key(&domain).await?;
        Ok(PublicKeyResponse {
            public_key: BASE64.encode(keys.public_key_bytes()),
        })
    }

    pub async fn sign_challenge(
        &self,
        request_domain: &str,
        challenge: JsonValue,
    ) -> Result<SignatureResponse> {
        self.ensure_ready().await?;
        let domain = request_domain_of(request_domain)?;
        self.check_rate(&domain)?;

        let challenge = Challenge::from_value(challenge)?;

        if !self.replay.consume_if_unused(&challenge.nonce).await? {
            audit::record(&SecurityEvent::ReplayDetected {
                domain: domain.clone(),
                nonce_fp: fingerprint(&challenge.nonce),
            });
            return Err(IdentityError::InvalidChallenge("Nonce has already been used".into()));
        }

        let challenge_domain = domain::normalize(&challenge.domain);
        if challenge_domain != domain {
            audit::record(&SecurityEvent::DomainMismatch {
                request_domain: domain.clone(),
                challenge_domain: challenge_domain.clone(),
            });
            return Err(IdentityError::DomainMismatch(format!(
                "Challenge is for {} but the request came from {}",
                challenge_domain, domain
            )));
        }

        if challenge.is_expired(self.clock.now_ms()) {
            return Err(IdentityError::ChallengeExpired(
                "Challenge expiry time has passed".into(),
            ));
        }

        let keys = self.site_key(&domain).await?;
        let signature = challenge::sign(&challenge, keys.signing_key());
        debug!(domain = %domain, action = ?challenge.action, "Challenge signed");
        Ok(SignatureResponse::new(signature, &keys))
    }

    /// Sign arbitrary text with the requesting site's key.
    pub async fn sign_message(&self, request_domain: &str, message: &str) -> Result<SignatureResponse> {
        self.ensure_ready().await?;
        let domain = request_domain_of(request_domain)?;
        self.check_rate(&domain)?;

        let keys = self.site_key(&domain).await?;
        let signature = challenge::sign_message(message.as_bytes(), keys.signing_key());
        debug!(domain = %domain, len = message.len(), "Message signed");
        Ok(SignatureResponse::new(signature, &keys))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Step 1: no cryptographic work, only the flag and the session.
    async fn ensure_ready(&self) -> Result<()> {
        if !self.vault.is_initialized().await? {
            return Err(IdentityError::NotInitialized("No identity has been set up".into()));
        }
        if !self.vault.has_active_session().await {
            return Err(IdentityError::NotInitialized("No active session".into()));
        }
        Ok(())
    }

    fn check_rate(&self, domain: &str) -> Result<()> {
        if self.limiter.allow(domain) {
            Ok(())
        } else {
            Err(IdentityError::RateLimitExceeded(format!(
                "Too many signing requests from {}",
                domain
            )))
        }
    }

    async fn site_key(&self, domain: &str) -> Result<SiteKeyPair> {
        let master = self.vault.load_master_secret().await?.ok_or_else(|| {
            IdentityError::Decryption(
                "Unable to unlock identity; restore from your seed phrase".into(),
            )
        })?;
        derive_site_key(&master, domain)
    }

    async fn derive_master(&self, phrase: SeedPhrase) -> Result<(SeedPhrase, MasterSecret)> {
        let iterations = self.config.kdf_iterations;
        let derived = tokio::task::spawn_blocking(move || {
            let master = derive_master_secret(&phrase, iterations);
            (phrase, master)
        })
        .await?;
        Ok(derived)
    }

    /// Save the master secret, re-keying the device if its stored key was
    /// sealed by an earlier session.
    async fn persist_master(&self, master: &MasterSecret) -> Result<()> {
        match self.vault.save_master_secret(master).await {
            Ok(()) => Ok(()),
            Err(VaultError::Decryption(_)) | Err(VaultError::Corrupt(_)) => {
                warn!("Stored device key unreadable in this session, rotating");
                self.vault.rotate_device_key().await?;
                self.vault.save_master_secret(master).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn stamp_created_at(&self) -> Result<()> {
        let existing: Option<u64> = storage::load(self.store.as_ref(), KEY_CREATED_AT).await?;
        if existing.is_none() {
            storage::save(self.store.as_ref(), KEY_CREATED_AT, &self.clock.now_ms()).await?;
        }
        Ok(())
    }
}

fn request_domain_of(input: &str) -> Result<String> {
    let domain = domain::normalize(input);
    if domain.is_empty() {
        return Err(IdentityError::DomainMismatch("Request has no origin domain".into()));
    }
    Ok(domain)
}
