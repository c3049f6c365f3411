//! Configuration for seedid
//!
//! CLI arguments and environment variables (clap), turned into the
//! library-level [`CoreConfig`] consumed by `IdentityService`.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::crypto::MASTER_SECRET_ITERATIONS;
use crate::guard::{RateLimitConfig, ReplayConfig};
use crate::identity::seed_slot::DEFAULT_DISPLAY_WINDOW;

/// Lowest PBKDF2 iteration count the CLI accepts
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

/// seedid - per-site identities from one seed phrase
#[derive(Parser, Debug, Clone)]
#[command(name = "seedid")]
#[command(about = "Seed-phrase derived per-site Ed25519 identities with challenge signing")]
pub struct Args {
    /// JSON file holding the encrypted vault and nonce set.
    /// When unset, state lives in memory and is lost on exit.
    #[arg(long, env = "SEEDID_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// PBKDF2 iterations for master secret derivation and wrapping
    #[arg(long, env = "SEEDID_KDF_ITERATIONS", default_value_t = MASTER_SECRET_ITERATIONS)]
    pub kdf_iterations: u32,

    /// Signatures allowed per domain per window
    #[arg(long, env = "SEEDID_RATE_LIMIT_MAX", default_value = "30")]
    pub rate_limit_max: u32,

    /// Rate limit window length in seconds
    #[arg(long, env = "SEEDID_RATE_LIMIT_WINDOW_SECS", default_value = "60")]
    pub rate_limit_window_secs: u64,

    /// How long a consumed nonce is remembered, in seconds
    #[arg(long, env = "SEEDID_NONCE_TTL_SECS", default_value = "600")]
    pub nonce_ttl_secs: u64,

    /// Maximum number of remembered nonces
    #[arg(long, env = "SEEDID_NONCE_CAPACITY", default_value = "1000")]
    pub nonce_capacity: usize,

    /// How long a new seed phrase stays readable, in seconds
    #[arg(long, env = "SEEDID_SEED_DISPLAY_SECS", default_value = "300")]
    pub seed_display_secs: u64,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.kdf_iterations < MIN_KDF_ITERATIONS {
            return Err(format!(
                "SEEDID_KDF_ITERATIONS must be at least {}",
                MIN_KDF_ITERATIONS
            ));
        }
        if self.rate_limit_max == 0 {
            return Err("SEEDID_RATE_LIMIT_MAX must be greater than 0".to_string());
        }
        if self.rate_limit_window_secs == 0 {
            return Err("SEEDID_RATE_LIMIT_WINDOW_SECS must be greater than 0".to_string());
        }
        if self.nonce_ttl_secs == 0 {
            return Err("SEEDID_NONCE_TTL_SECS must be greater than 0".to_string());
        }
        if self.nonce_capacity == 0 {
            return Err("SEEDID_NONCE_CAPACITY must be greater than 0".to_string());
        }
        if self.seed_display_secs == 0 {
            return Err("SEEDID_SEED_DISPLAY_SECS must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            kdf_iterations: self.kdf_iterations,
            rate_limit: RateLimitConfig {
                max_requests: self.rate_limit_max,
                window_ms: self.rate_limit_window_secs.saturating_mul(1000),
            },
            replay: ReplayConfig {
                ttl_ms: self.nonce_ttl_secs.saturating_mul(1000),
                capacity: self.nonce_capacity,
            },
            seed_display: Duration::from_secs(self.seed_display_secs),
        }
    }
}

/// Settings for one `IdentityService`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// PBKDF2 iterations (master secret and its wrapping key)
    pub kdf_iterations: u32,
    pub rate_limit: RateLimitConfig,
    pub replay: ReplayConfig,
    /// Display window for a freshly created seed phrase
    pub seed_display: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: MASTER_SECRET_ITERATIONS,
            rate_limit: RateLimitConfig::default(),
            replay: ReplayConfig::default(),
            seed_display: DEFAULT_DISPLAY_WINDOW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["seedid"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_match_core_defaults() {
        let args = parse(&[]);
        assert!(args.validate().is_ok());
        assert_eq!(args.core_config(), CoreConfig::default());
    }

    #[test]
    fn test_rejects_weak_kdf() {
        let args = parse(&["--kdf-iterations", "1000"]);
        assert!(args.validate().unwrap_err().contains("KDF"));
    }

    #[test]
    fn test_rejects_zero_limits() {
        assert!(parse(&["--rate-limit-max", "0"]).validate().is_err());
        assert!(parse(&["--nonce-capacity", "0"]).validate().is_err());
    }

    #[test]
    fn test_core_config_conversion() {
        let args = parse(&[
            "--rate-limit-max",
            "5",
            "--rate-limit-window-secs",
            "10",
            "--nonce-ttl-secs",
            "30",
            "--seed-display-secs",
            "20",
        ]);
        let core = args.core_config();
        assert_eq!(core.rate_limit.max_requests, 5);
        assert_eq!(core.rate_limit.window_ms, 10_000);
        assert_eq!(core.replay.ttl_ms, 30_000);
        assert_eq!(core.seed_display, Duration::from_secs(20));
    }
}
