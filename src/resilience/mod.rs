//! Resilience primitives: per-provider admission control and bounded retry.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Sliding-window (trailing 60s) admission per provider |
//! | [`retry`] | Exponential-backoff retry around a single provider call |
//!
//! ## Rate Limiter
//!
//! ```rust
//! use ai_relay::resilience::rate_limiter::RateLimiter;
//!
//! let limiter = RateLimiter::new();
//! limiter.register("gemini", 5); // 5 requests per minute
//! # tokio_test::block_on(async {
//! assert!(limiter.admit("gemini"));
//! # });
//! ```
//!
//! Denial never blocks: callers move on to the next provider.
//!
//! ## Retry Policy
//!
//! ```rust
//! use ai_relay::resilience::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(4));
//! assert_eq!(policy.backoff(1), Duration::from_millis(500));
//! assert_eq!(policy.backoff(2), Duration::from_secs(1));
//! ```

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{RateLimiter, RateWindowSnapshot};
pub use retry::{RetryOutcome, RetryPolicy};
