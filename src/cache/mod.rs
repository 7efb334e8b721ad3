//! # Response Caching Module
//!
//! Identical generation requests are answered from memory instead of a provider.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`fingerprint`] | Deterministic key from a rendered prompt and its parameters |
//! | [`ResponseCache`] | TTL policy, statistics and sweep over a backend |
//! | [`CacheConfig`] | TTL (24h default), capacity (1000 default), on/off switch |
//! | [`CacheBackend`] | Trait for pluggable storage |
//! | [`MemoryCache`] | Bounded in-memory store, oldest entry evicted first |
//! | [`NullCache`] | No-op backend used when caching is disabled |
//!
//! ## Example
//!
//! ```rust
//! use ai_relay::cache::{fingerprint, CacheConfig, ResponseCache};
//! use ai_relay::types::{GenerationParams, Prompt};
//!
//! # tokio_test::block_on(async {
//! let cache = ResponseCache::from_config(CacheConfig::default());
//! let key = fingerprint(&Prompt::user("Explain X"), &GenerationParams::new());
//! cache.store(&key, "answer-1").await;
//! assert_eq!(cache.lookup(&key).await.as_deref(), Some("answer-1"));
//! # });
//! ```
//!
//! ## Key Generation
//!
//! Keys cover the system text, user text, temperature, output limit and every extra
//! option. Who asked is not part of the key, so identical prompts from different
//! callers share one entry. Anything personal must be rendered into the prompt to
//! affect the key.

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use key::{fingerprint, CacheKey};
pub use manager::{CacheConfig, CacheStats, ResponseCache, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
