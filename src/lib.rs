//! seedid - per-site identities from a single seed phrase
//!
//! One recovery phrase deterministically yields an unlinkable Ed25519 key
//! for every website. Sites receive signed challenge responses and public
//! keys, never the phrase or the master secret.
//!
//! ## Components
//!
//! - **Crypto**: phrase generation/validation, master secret and site key derivation
//! - **Vault**: session → device → master secret encryption chain over a key-value store
//! - **Challenge**: canonical encoding, signing and verification of relying-party challenges
//! - **Guard**: nonce replay protection and per-domain rate limiting
//! - **Identity**: the request pipeline and the temporary seed phrase slot
//! - **Bridge**: tagged request/response boundary for the UI and embedding pages

pub mod bridge;
pub mod challenge;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod guard;
pub mod identity;
pub mod logging;
pub mod storage;
pub mod types;
pub mod vault;

pub use bridge::{Bridge, BridgeResponse, PageAction, PageMessage, Request};
pub use config::{Args, CoreConfig};
pub use identity::IdentityService;
pub use types::{IdentityError, Result};
