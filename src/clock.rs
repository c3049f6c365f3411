//! Time source for expiry, replay and rate-window decisions.
//!
//! All comparisons in the core are done in Unix milliseconds, the unit
//! relying parties use for `timestamp` and `expiresAt`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the current time in Unix milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
    }
}

/// Manually driven clock for deterministic tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
