//! Cryptographic building blocks.
//!
//! - [`mnemonic`]: recovery phrase generation and validation (BIP-39)
//! - [`derivation`]: phrase → master secret → per-site Ed25519 keys
//! - [`aead`]: ChaCha20-Poly1305 sealing used by the secret vault

pub mod aead;
pub mod derivation;
pub mod mnemonic;

pub use aead::{CipherError, EncryptedBlob};
pub use derivation::{
    derive_master_secret, derive_site_key, MasterSecret, SiteKeyPair, MASTER_SECRET_ITERATIONS,
};
pub use mnemonic::{MnemonicError, SeedPhrase};
