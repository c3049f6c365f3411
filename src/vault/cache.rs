//! In-memory cache for the decrypted device key.
//!
//! The device key is decrypted once per session and kept here so the
//! session-key layer is not re-opened on every signing request.
//!
//! # Security
//!
//! - Key bytes are zeroized when the entry is dropped
//! - [`DeviceKeyCache::clear`] zeroizes explicitly before releasing the slot

use std::sync::atomic::{AtomicU64, Ordering};

use zeroize::{Zeroize, Zeroizing};

use crate::crypto::aead::KEY_LEN;

// =============================================================================
// Cached Device Key
// =============================================================================

/// A decrypted device key.
pub struct CachedDeviceKey {
    key_bytes: [u8; KEY_LEN],
}

impl CachedDeviceKey {
    pub fn new(key_bytes: [u8; KEY_LEN]) -> Self {
        Self { key_bytes }
    }

    /// Copy of the key bytes, itself zeroized on drop.
    pub fn key(&self) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(self.key_bytes)
    }
}

impl Drop for CachedDeviceKey {
    fn drop(&mut self) {
        self.key_bytes.zeroize();
    }
}

// =============================================================================
// Cache Statistics
// =============================================================================

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub clears: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub clears: u64,
}

impl CacheStats {
    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Device Key Cache
// =============================================================================

/// Single-slot cache for the device key.
#[derive(Default)]
pub struct DeviceKeyCache {
    entry: Option<CachedDeviceKey>,
    stats: CacheStats,
}

impl DeviceKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached key, if any.
    pub fn get(&self) -> Option<Zeroizing<[u8; KEY_LEN]>> {
        match &self.entry {
            Some(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.key())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&mut self, key_bytes: [u8; KEY_LEN]) {
        self.clear();
        self.entry = Some(CachedDeviceKey::new(key_bytes));
    }

    pub fn contains(&self) -> bool {
        self.entry.is_some()
    }

    /// Zero the cached key, then drop it.
    pub fn clear(&mut self) {
        if let Some(mut entry) = self.entry.take() {
            entry.key_bytes.zeroize();
            self.stats.clears.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

// =============================================================================
// Tests
// =============================================================================
