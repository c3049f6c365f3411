//! Identity lifecycle and signing orchestration.

pub mod seed_slot;
pub mod service;

pub use seed_slot::SeedSlot;
pub use service::{
    IdentityService, IdentityState, PublicKeyResponse, SeedPhraseResponse, SignatureResponse,
};
