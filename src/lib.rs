//! # ai-relay
//!
//! Resilient multi-provider text generation. One call in, one displayable answer out,
//! with caching, per-provider rate limits, retry and provider fallback in between.
//!
//! ## Overview
//!
//! Every request goes through the same pipeline:
//!
//! 1. Fingerprint the rendered prompt and parameters and check the response cache
//! 2. Walk the providers in configured order, skipping any whose rate window is full
//! 3. Call each admitted provider through its retry policy
//! 4. Store the first success in the cache, or return the context's apology text
//!
//! Failures never escape as errors from [`Orchestrator::generate`]; the chat layer
//! always has text to show.
//!
//! ## Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`cache`] | Fingerprinting, TTL response cache, pluggable backends |
//! | [`resilience`] | Sliding-window rate limiter, exponential-backoff retry |
//! | [`provider`] | `ProviderAdapter` trait, OpenAI and Gemini adapters, error kinds |
//! | [`transport`] | Pooled JSON-over-HTTP client |
//! | [`orchestrator`] | The generation state machine, single-flight, fallbacks, templates |
//! | [`config`] | YAML configuration with environment overrides |
//! | [`types`] | Requests, prompts, parameters, results |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_relay::config::RelayConfig;
//! use ai_relay::orchestrator::UserInfo;
//!
//! #[tokio::main]
//! async fn main() -> ai_relay::Result<()> {
//!     let mut config = RelayConfig::load("relay.yaml")?;
//!     config.apply_env_overrides()?;
//!     let relay = config.build_orchestrator()?;
//!
//!     let result = relay
//!         .respond("user-42", "Explain compound interest", "general", &UserInfo::new())
//!         .await;
//!     println!("[{}] {}", result.provider_used, result.content);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod resilience;
pub mod transport;
pub mod types;

pub use crate::config::RelayConfig;
pub use crate::error::{Error, ErrorContext};
pub use crate::orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorStats};
pub use crate::provider::{Provider, ProviderAdapter, ProviderError, ProviderErrorKind, ProviderSpec};
pub use crate::resilience::{RateLimiter, RetryPolicy};
pub use crate::types::{
    GenerationParams, GenerationRequest, GenerationResult, Prompt, ResultSource,
};

/// Result type alias for construction and configuration paths.
pub type Result<T> = std::result::Result<T, Error>;
