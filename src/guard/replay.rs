//! Challenge nonce replay protection.
//!
//! Consumed nonces are kept in storage as `nonce → consumed_at_ms`. Before
//! each insert, entries older than the TTL are dropped and the map is capped
//! at `capacity` entries (oldest first).
//!
//! Under sustained traffic the cap can evict a nonce before its TTL runs
//! out, which makes that nonce acceptable again. Relying parties that need a
//! hard guarantee must also enforce short `expiresAt` values.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::storage::{self, KeyValueStore, StorageResult, KEY_USED_NONCES};

/// Default lifetime of a consumed nonce (10 minutes)
pub const DEFAULT_NONCE_TTL_MS: u64 = 10 * 60 * 1000;

/// Default cap on retained nonces
pub const DEFAULT_NONCE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    pub ttl_ms: u64,
    pub capacity: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_NONCE_TTL_MS,
            capacity: DEFAULT_NONCE_CAPACITY,
        }
    }
}

type NonceMap = HashMap<String, u64>;

pub struct ReplayGuard {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: ReplayConfig,

    /// Serializes the load-check-insert-save cycle
    lock: Mutex<()>,
}

impl ReplayGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: ReplayConfig) -> Self {
        Self {
            store,
            clock,
            config,
            lock: Mutex::new(()),
        }
    }

    /// Record `nonce` as used.
    ///
    /// Returns `false` if it was already consumed (a replay).
    pub async fn consume_if_unused(&self, nonce: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock().await;

        let mut nonces: NonceMap = storage::load(self.store.as_ref(), KEY_USED_NONCES)
            .await?
            .unwrap_or_default();

        if nonces.contains_key(nonce) {
            debug!("Nonce already consumed");
            return Ok(false);
        }

        let now = self.clock.now_ms();
        self.prune(&mut nonces, now);
        nonces.insert(nonce.to_string(), now);

        storage::save(self.store.as_ref(), KEY_USED_NONCES, &nonces).await?;
        Ok(true)
    }

    /// Drop expired entries, then the oldest until there is room for one more.
    fn prune(&self, nonces: &mut NonceMap, now: u64) {
        let ttl = self.config.ttl_ms;
        nonces.retain(|_, consumed_at| now.saturating_sub(*consumed_at) < ttl);

        if nonces.len() >= self.config.capacity {
            let mut by_age: Vec<(String, u64)> = nonces.drain().collect();
            by_age.sort_by(|a, b| b.1.cmp(&a.1));
            by_age.truncate(self.config.capacity.saturating_sub(1));
            nonces.extend(by_age);
        }
    }

    /// Number of nonces currently retained.
    pub async fn len(&self) -> StorageResult<usize> {
        let _guard = self.lock.lock().await;
        let nonces: Option<NonceMap> = storage::load(self.store.as_ref(), KEY_USED_NONCES).await?;
        Ok(nonces.map(|n| n.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    fn guard(config: ReplayConfig) -> (ReplayGuard, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(5_000_000));
        let store = Arc::new(MemoryStore::new());
        (ReplayGuard::new(store, clock.clone(), config), clock)
    }

    #[tokio::test]
    async fn test_second_use_rejected() {
        let (guard, _) = guard(ReplayConfig::default());
        assert!(guard.consume_if_unused("n1").await.unwrap());
        assert!(!guard.consume_if_unused("n1").await.unwrap());
        assert!(guard.consume_if_unused("n2").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_within_ttl() {
        let (guard, clock) = guard(ReplayConfig::default());
        assert!(guard.consume_if_unused("n1").await.unwrap());

        clock.advance(DEFAULT_NONCE_TTL_MS - 1);
        assert!(!guard.consume_if_unused("n1").await.unwrap());
    }

    #[tokio::test]
    async fn test_reusable_after_ttl_eviction() {
        let (guard, clock) = guard(ReplayConfig::default());
        assert!(guard.consume_if_unused("n1").await.unwrap());

        clock.advance(DEFAULT_NONCE_TTL_MS);
        // Another insert prunes the expired entry
        assert!(guard.consume_if_unused("n2").await.unwrap());
        assert!(guard.consume_if_unused("n1").await.unwrap());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let config = ReplayConfig {
            ttl_ms: DEFAULT_NONCE_TTL_MS,
            capacity: 3,
        };
        let (guard, clock) = guard(config);

        for n in ["a", "b", "c"] {
            assert!(guard.consume_if_unused(n).await.unwrap());
            clock.advance(1);
        }
        assert!(guard.consume_if_unused("d").await.unwrap());
        assert_eq!(guard.len().await.unwrap(), 3);

        // "a" was evicted under capacity pressure, so it is accepted again
        assert!(guard.consume_if_unused("a").await.unwrap());
        assert!(!guard.consume_if_unused("d").await.unwrap());
    }

    #[tokio::test]
    async fn test_default_cap_bounds_storage() {
        let (guard, clock) = guard(ReplayConfig::default());
        for i in 0..1_050 {
            assert!(guard.consume_if_unused(&format!("n{}", i)).await.unwrap());
            clock.advance(1);
        }
        assert_eq!(guard.len().await.unwrap(), DEFAULT_NONCE_CAPACITY);
    }

    #[tokio::test]
    async fn test_concurrent_same_nonce_accepted_once() {
        let (guard, _) = guard(ReplayConfig::default());
        let guard = Arc::new(guard);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let g = guard.clone();
            handles.push(tokio::spawn(async move { g.consume_if_unused("race").await.unwrap() }));
        }

        let mut accepted = 0;
        for h in handles {
            if h.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }
}
