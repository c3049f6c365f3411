//! Per-domain rate limiting for signing operations.
//!
//! Fixed-start window per domain: the first request opens a window, and
//! once the window is older than `window_ms` the next request opens a fresh
//! one. State lives in memory only, so a restart resets every counter.
//!
//! Rolled-over windows are swept at most once per window length from
//! `allow` itself, so the map stays bounded by the domains seen in roughly
//! the last two windows.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::clock::Clock;
use crate::logging::audit::{self, SecurityEvent};

/// Default signs allowed per window
pub const DEFAULT_MAX_REQUESTS: u32 = 30;

/// Default window length (60 seconds)
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

/// Counter for one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub window_start: u64,
}

/// Rate limiter keyed by normalized domain.
///
/// `DashMap::entry` holds the shard lock for the whole check-and-increment,
/// so concurrent requests for one domain cannot interleave.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,

    /// When stale windows were last swept (Unix ms)
    last_sweep: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            windows: DashMap::new(),
            config,
            clock,
            last_sweep: AtomicU64::new(now),
        }
    }

    /// Check if a request is allowed and record it.
    pub fn allow(&self, domain: &str) -> bool {
        let now = self.clock.now_ms();
        // Must run before taking the entry: `retain` locks every shard
        self.maybe_sweep(now);

        let mut window = self
            .windows
            .entry(domain.to_string())
            .or_insert(RateWindow {
                count: 0,
                window_start: now,
            });

        if window.count == 0 || now.saturating_sub(window.window_start) > self.config.window_ms {
            *window = RateWindow {
                count: 1,
                window_start: now,
            };
            return true;
        }

        window.count = window.count.saturating_add(1);
        if window.count <= self.config.max_requests {
            return true;
        }

        let count = window.count;
        drop(window);
        audit::record(&SecurityEvent::RateLimitExceeded {
            domain: domain.to_string(),
            count,
        });
        false
    }

    /// Current window for a domain, if any.
    pub fn window(&self, domain: &str) -> Option<RateWindow> {
        self.windows.get(domain).map(|w| *w)
    }

    fn maybe_sweep(&self, now: u64) {
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now.saturating_sub(last) <= self.config.window_ms {
            return;
        }
        // One caller wins the sweep for this interval
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.sweep(now);
        }
    }

    /// Drop windows that have already rolled over.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        self.last_sweep.store(now, Ordering::Relaxed);
        self.sweep(now)
    }

    fn sweep(&self, now: u64) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_sub(w.window_start) <= self.config.window_ms);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "Pruned stale rate windows");
        }
        removed
    }

    /// Forget every counter.
    pub fn clear(&self) {
        self.windows.clear();
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (RateLimiter::new(RateLimitConfig::default(), clock.clone()), clock)
    }

    #[test]
    fn test_allows_exactly_max_per_window() {
        let (limiter, _) = limiter();
        for i in 0..30 {
            assert!(limiter.allow("example.com"), "request {} should pass", i + 1);
        }
        assert!(!limiter.allow("example.com"));
        assert!(!limiter.allow("example.com"));
    }

    #[test]
    fn test_window_rolls_over() {
        let (limiter, clock) = limiter();
        for _ in 0..31 {
            limiter.allow("example.com");
        }
        assert!(!limiter.allow("example.com"));

        // Still inside the window at exactly 60s
        clock.advance(60_000);
        assert!(!limiter.allow("example.com"));

        clock.advance(1);
        assert!(limiter.allow("example.com"));
        assert_eq!(limiter.window("example.com").unwrap().count, 1);
    }

    #[test]
    fn test_domains_are_independent() {
        let (limiter, _) = limiter();
        for _ in 0..30 {
            assert!(limiter.allow("a.com"));
        }
        assert!(!limiter.allow("a.com"));
        assert!(limiter.allow("b.com"));
    }

    #[test]
    fn test_clear_resets() {
        let (limiter, _) = limiter();
        for _ in 0..31 {
            limiter.allow("a.com");
        }
        limiter.clear();
        assert!(limiter.is_empty());
        assert!(limiter.allow("a.com"));
    }

    #[test]
    fn test_allow_sweeps_stale_domains() {
        let (limiter, clock) = limiter();
        for i in 0..10_000 {
            assert!(limiter.allow(&format!("site{}.com", i)));
        }
        assert_eq!(limiter.len(), 10_000);

        clock.advance(60 * 60 * 1000);
        assert!(limiter.allow("fresh.com"));
        assert_eq!(limiter.len(), 1);
        assert!(limiter.window("fresh.com").is_some());
    }

    #[test]
    fn test_sweep_keeps_live_windows() {
        let (limiter, clock) = limiter();
        for _ in 0..31 {
            limiter.allow("busy.com");
        }
        clock.advance(30_000);
        limiter.allow("late.com");

        // Past one window since construction, "busy.com" has rolled over
        clock.advance(30_001);
        assert!(limiter.allow("other.com"));
        assert!(limiter.window("busy.com").is_none());
        assert!(limiter.window("late.com").is_some());
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_cleanup_removes_rolled_windows() {
        let (limiter, clock) = limiter();
        limiter.allow("a.com");
        clock.advance(30_000);
        limiter.allow("b.com");
        clock.advance(30_001);

        assert_eq!(limiter.cleanup(), 1);
        assert!(limiter.window("a.com").is_none());
        assert!(limiter.window("b.com").is_some());
    }
}
