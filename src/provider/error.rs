//! Provider failure taxonomy.
//!
//! Every failed `generate` call resolves to one of four kinds. The kind alone decides
//! what happens next:
//!
//! | Kind            | Retried locally | Next step after budget    |
//! |-----------------|-----------------|---------------------------|
//! | `Timeout`       | yes             | fall back                 |
//! | `Transient`     | yes             | fall back                 |
//! | `QuotaExceeded` | no              | fall back immediately     |
//! | `Invalid`       | no              | fall back immediately     |

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Call exceeded its per-call timeout (or the overall deadline).
    Timeout,
    /// Rate limit or billing quota hit on the provider side.
    QuotaExceeded,
    /// Network hiccup or provider-side server error.
    Transient,
    /// Request rejected, credentials missing, or reply unusable.
    Invalid,
}

impl ProviderErrorKind {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Transient => "transient",
            Self::Invalid => "invalid",
        }
    }

    /// Whether the retry policy may attempt the same provider again.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transient)
    }

    /// Maps an HTTP status code to the most likely kind.
    ///
    /// Status codes without a mapping are treated as `Invalid` so they are not retried.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            408 | 504 => Self::Timeout,
            429 => Self::QuotaExceeded,
            400 | 401 | 403 | 404 | 413 | 422 => Self::Invalid,
            500..=599 => Self::Transient,
            _ => Self::Invalid,
        }
    }

    /// Maps a provider error code/status string to a kind.
    ///
    /// Covers OpenAI-style `error.code` values and Gemini-style `error.status` values.
    pub fn from_provider_code(code: &str) -> Option<Self> {
        let kind = match code {
            "insufficient_quota" | "rate_limit_exceeded" | "RESOURCE_EXHAUSTED" => {
                Self::QuotaExceeded
            }
            "invalid_api_key" | "model_not_found" | "context_length_exceeded"
            | "invalid_request_error" | "INVALID_ARGUMENT" | "PERMISSION_DENIED"
            | "UNAUTHENTICATED" | "NOT_FOUND" | "FAILED_PRECONDITION" => Self::Invalid,
            "server_error" | "INTERNAL" | "UNAVAILABLE" => Self::Transient,
            "DEADLINE_EXCEEDED" => Self::Timeout,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single failed provider attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{provider} {kind}: {message}{}", format_status(.status))]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub provider_code: Option<String>,
}

fn format_status(status: &Option<u16>) -> String {
    match status {
        Some(s) => format!(" (HTTP {})", s),
        None => String::new(),
    }
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
            status: None,
            provider_code: None,
        }
    }

    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Timeout, message)
    }

    pub fn quota_exceeded(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::QuotaExceeded, message)
    }

    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Transient, message)
    }

    pub fn invalid(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::Invalid, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Classify a non-success HTTP reply.
    ///
    /// A recognised provider code in the body wins over the status code, so a 429
    /// carrying `insufficient_quota` and a 400 carrying `RESOURCE_EXHAUSTED` both read
    /// as `QuotaExceeded`.
    pub fn from_http(
        provider: impl Into<String>,
        status: u16,
        provider_code: Option<String>,
        body: &str,
    ) -> Self {
        let kind = provider_code
            .as_deref()
            .and_then(ProviderErrorKind::from_provider_code)
            .unwrap_or_else(|| ProviderErrorKind::from_http_status(status));
        let mut err = Self::new(provider, kind, truncate(body, 512)).with_status(status);
        err.provider_code = provider_code;
        err
    }

    /// Classify a transport-level failure (no HTTP status available).
    pub fn from_reqwest(provider: impl Into<String>, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_decode() || err.is_builder() {
            ProviderErrorKind::Invalid
        } else {
            ProviderErrorKind::Transient
        };
        let mut out = Self::new(provider, kind, err.to_string());
        if let Some(status) = err.status() {
            out.status = Some(status.as_u16());
        }
        out
    }

    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
