use crate::provider::{ProviderError, ProviderErrorKind};
use serde::Serialize;

/// Provider label reported when no provider produced the text.
pub const PROVIDER_NONE: &str = "none";
/// Provider label reported for cache hits.
pub const PROVIDER_CACHE: &str = "cache";

/// Where the content of a `GenerationResult` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// A provider generated it during this call.
    Provider,
    /// Served from the response cache.
    Cache,
    /// Shared from a concurrent identical call.
    Coalesced,
    /// Every provider failed (or the deadline ran out); content is the apology text.
    Fallback,
}

/// One entry of the error trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptFailure {
    pub provider: String,
    /// 1-based attempt number on that provider; 0 for a rate-limit denial.
    pub attempt: u32,
    pub kind: Option<ProviderErrorKind>,
    pub message: String,
    pub latency_ms: u64,
}

impl AttemptFailure {
    pub fn from_error(err: &ProviderError, attempt: u32, latency_ms: u64) -> Self {
        Self {
            provider: err.provider.clone(),
            attempt,
            kind: Some(err.kind),
            message: err.message.clone(),
            latency_ms,
        }
    }

    pub fn rate_limited(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            attempt: 0,
            kind: None,
            message: "rate limit window full".to_string(),
            latency_ms: 0,
        }
    }

    pub fn is_rate_denial(&self) -> bool {
        self.kind.is_none()
    }
}

/// Outcome of one orchestrated generation. Always carries displayable text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub request_id: String,
    pub content: String,
    pub provider_used: String,
    pub source: ResultSource,
    /// True when the text was not generated by this call (cache hit or coalesced).
    pub cached: bool,
    /// Provider calls made during this request (0 for cache hits and coalesced results).
    pub attempts: u32,
    pub latency_ms: u64,
    pub error_trail: Vec<AttemptFailure>,
}

impl ResultSource {
    pub fn is_cached(&self) -> bool {
        matches!(self, ResultSource::Cache | ResultSource::Coalesced)
    }
}

impl GenerationResult {
    pub fn is_fallback(&self) -> bool {
        self.source == ResultSource::Fallback
    }
}
