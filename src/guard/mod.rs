//! Abuse guards in front of the signing pipeline.

pub mod rate_limit;
pub mod replay;

pub use rate_limit::{RateLimitConfig, RateLimiter, RateWindow};
pub use replay::{ReplayConfig, ReplayGuard};
