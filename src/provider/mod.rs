//! Provider adapters: one uniform `generate` capability per external AI backend.
//!
//! The set of backends is closed. Configuration picks a [`ProviderKind`], which
//! builds the matching [`Provider`] variant; the orchestrator only sees the
//! [`ProviderAdapter`] trait and never branches on the variant.

pub mod error;
pub mod gemini;
pub mod openai;

use crate::resilience::retry::RetryPolicy;
use crate::types::{GenerationParams, Prompt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ProviderError, ProviderErrorKind};
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Uniform text-generation capability.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Generate text for a rendered prompt.
    async fn generate(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<String, ProviderError>;

    /// Stable identifier used in logs and results.
    fn identify(&self) -> &str;
}

/// Backend families this crate can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions (and compatible APIs).
    OpenAi,
    /// Google Gemini generateContent.
    Gemini,
}

impl ProviderKind {
    pub fn id(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => openai::DEFAULT_BASE_URL,
            Self::Gemini => gemini::DEFAULT_BASE_URL,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => openai::DEFAULT_MODEL,
            Self::Gemini => gemini::DEFAULT_MODEL,
        }
    }
}

/// Static description of one configured provider slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSpec {
    pub name: String,
    /// Lower values are tried first.
    pub priority: u32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Admissions allowed per trailing 60 seconds; 0 disables limiting.
    pub requests_per_minute: u32,
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            timeout: DEFAULT_CALL_TIMEOUT,
            retry: RetryPolicy::default(),
            requests_per_minute: 0,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }
}

/// Closed set of concrete adapters, selected by configuration.
#[derive(Debug)]
pub enum Provider {
    OpenAi(OpenAiAdapter),
    Gemini(GeminiAdapter),
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::OpenAi(_) => ProviderKind::OpenAi,
            Provider::Gemini(_) => ProviderKind::Gemini,
        }
    }
}

#[async_trait]
impl ProviderAdapter for Provider {
    async fn generate(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        match self {
            Provider::OpenAi(a) => a.generate(prompt, params).await,
            Provider::Gemini(a) => a.generate(prompt, params).await,
        }
    }

    fn identify(&self) -> &str {
        match self {
            Provider::OpenAi(a) => a.identify(),
            Provider::Gemini(a) => a.identify(),
        }
    }
}

impl From<OpenAiAdapter> for Provider {
    fn from(a: OpenAiAdapter) -> Self {
        Provider::OpenAi(a)
    }
}

impl From<GeminiAdapter> for Provider {
    fn from(a: GeminiAdapter) -> Self {
        Provider::Gemini(a)
    }
}
