//! End-to-end identity scenarios driven through `IdentityService`.

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use tokio_test::{assert_err, assert_ok};

use seedid::challenge::{self, Challenge};
use seedid::clock::ManualClock;
use seedid::crypto::{derive_master_secret, derive_site_key, mnemonic, SeedPhrase};
use seedid::storage::MemoryStore;
use seedid::{CoreConfig, IdentityService};

const NOW: u64 = 1_700_000_000_000;
const ITERATIONS: u32 = 1_000;

fn config() -> CoreConfig {
    CoreConfig {
        kdf_iterations: ITERATIONS,
        ..CoreConfig::default()
    }
}

async fn service_at(clock: Arc<ManualClock>) -> IdentityService {
    IdentityService::start_with_clock(Arc::new(MemoryStore::new()), clock, config()).await
}

fn challenge_json(nonce: &str, domain: &str) -> JsonValue {
    json!({
        "nonce": nonce,
        "timestamp": 1000,
        "domain": domain,
        "action": "authenticate",
        "expiresAt": 9_999_999_999_999u64
    })
}

#[tokio::test]
async fn create_confirm_sign_and_verify() {
    let service = service_at(Arc::new(ManualClock::new(NOW))).await;

    let created = assert_ok!(service.initialize(None).await);
    assert_ok!(service.confirm_seed_backup().await);

    let raw = challenge_json("n1", "example.com");
    let signed = assert_ok!(service.sign_challenge("example.com", raw.clone()).await);

    let challenge = assert_ok!(Challenge::from_value(raw));
    assert!(assert_ok!(challenge::verify_base64(
        &challenge,
        &signed.signature,
        &signed.public_key
    )));

    // The library derivation path agrees with the service
    let phrase = assert_ok!(SeedPhrase::parse(&created.seed_phrase));
    let master = derive_master_secret(&phrase, ITERATIONS);
    let keys = assert_ok!(derive_site_key(&master, "example.com"));
    let expected = base64_encode(&keys.public_key_bytes());
    assert_eq!(signed.public_key, expected);
}

#[tokio::test]
async fn restore_reproduces_public_keys() {
    let original = service_at(Arc::new(ManualClock::new(NOW))).await;
    let created = assert_ok!(original.initialize(None).await);
    assert_ok!(original.confirm_seed_backup().await);
    let before = assert_ok!(original.get_public_key("example.com").await);

    let restored = service_at(Arc::new(ManualClock::new(NOW))).await;
    assert_ok!(restored.initialize(Some(created.seed_phrase.clone())).await);
    let after = assert_ok!(restored.get_public_key("https://www.example.com").await);

    assert_eq!(before, after);
}

#[tokio::test]
async fn relayed_challenge_is_refused() {
    let service = service_at(Arc::new(ManualClock::new(NOW))).await;
    let phrase = assert_ok!(mnemonic::generate());
    assert_ok!(service.initialize(Some(phrase.as_str().to_string())).await);

    let err = assert_err!(
        service
            .sign_challenge("attacker.com", challenge_json("n1", "example.com"))
            .await
    );
    assert_eq!(err.code(), "DOMAIN_MISMATCH");
}

#[tokio::test]
async fn replayed_nonce_is_refused() {
    let service = service_at(Arc::new(ManualClock::new(NOW))).await;
    let phrase = assert_ok!(mnemonic::generate());
    assert_ok!(service.initialize(Some(phrase.as_str().to_string())).await);

    assert_ok!(
        service
            .sign_challenge("example.com", challenge_json("n1", "example.com"))
            .await
    );
    let err = assert_err!(
        service
            .sign_challenge("example.com", challenge_json("n1", "example.com"))
            .await
    );
    assert_eq!(err.code(), "INVALID_CHALLENGE");
}

#[tokio::test]
async fn rate_limit_window_rolls_over() {
    let clock = Arc::new(ManualClock::new(NOW));
    let service = service_at(clock.clone()).await;
    let phrase = assert_ok!(mnemonic::generate());
    assert_ok!(service.initialize(Some(phrase.as_str().to_string())).await);

    for i in 0..15 {
        assert_ok!(
            service
                .sign_challenge("example.com", challenge_json(&format!("n{}", i), "example.com"))
                .await
        );
        assert_ok!(service.sign_message("example.com", "hello").await);
    }

    let err = assert_err!(service.sign_message("example.com", "hello").await);
    assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");

    // Other sites are unaffected
    assert_ok!(service.sign_message("other.com", "hello").await);

    clock.advance(60_001);
    assert_ok!(service.sign_message("example.com", "hello").await);
}

#[tokio::test]
async fn site_keys_are_isolated() {
    let service = service_at(Arc::new(ManualClock::new(NOW))).await;
    let phrase = assert_ok!(mnemonic::generate());
    assert_ok!(service.initialize(Some(phrase.as_str().to_string())).await);

    let mut seen = std::collections::HashSet::new();
    for i in 0..50 {
        let pk = assert_ok!(service.get_public_key(&format!("site{}.com", i)).await);
        assert!(seen.insert(pk.public_key));
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(bytes)
}
