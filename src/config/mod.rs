//! # Configuration
//!
//! YAML document describing providers, cache, retry defaults and per-context
//! behaviour, with environment overrides for the operational knobs.
//!
//! | Environment variable | Overrides |
//! |----------------------|-----------|
//! | `AI_RELAY_DEADLINE_MS` | `deadline_ms` |
//! | `AI_RELAY_CACHE_TTL_SECS` | `cache.ttl_secs` |
//! | `AI_RELAY_CACHE_MAX_ENTRIES` | `cache.max_entries` |
//! | `AI_RELAY_RETRY_MAX_ATTEMPTS` | `retry.max_attempts` |
//! | `AI_RELAY_RETRY_BASE_MS` | `retry.base_backoff_ms` |
//! | `AI_RELAY_RETRY_MAX_MS` | `retry.max_backoff_ms` |
//! | `AI_RELAY_<NAME>_RPM` | `providers[name].requests_per_minute` |
//!
//! API keys resolve from `api_key`, then the variable named by `api_key_env`, then
//! `<NAME>_API_KEY`, where `<NAME>` is the provider name upper-cased with
//! non-alphanumerics replaced by `_`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::cache::{CacheConfig, DEFAULT_MAX_ENTRIES};
use crate::error::{Error, ErrorContext};
use crate::orchestrator::{
    ContextTemplate, FallbackMessages, Orchestrator, DEFAULT_DEADLINE, DEFAULT_SYSTEM_PROMPT,
};
use crate::provider::{
    GeminiAdapter, OpenAiAdapter, Provider, ProviderKind, ProviderSpec, DEFAULT_CALL_TIMEOUT,
};
use crate::resilience::retry::RetryPolicy;
use crate::types::{GenerationParams, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE};
use crate::Result;

fn default_deadline_ms() -> u64 {
    DEFAULT_DEADLINE.as_millis() as u64
}
fn default_true() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}
fn default_sweep_secs() -> u64 {
    300
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8000
}
fn default_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT.as_millis() as u64
}
fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}
fn default_max_output_tokens() -> u32 {
    DEFAULT_MAX_OUTPUT_TOKENS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Overall per-call deadline.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default)]
    pub cache: CacheSection,
    /// Default retry budget for providers without their own `retry` block.
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub generation: GenerationSection,
    pub providers: Vec<ProviderConfig>,
    /// Context tag -> provider names, in the order to try them.
    #[serde(default)]
    pub routes: BTreeMap<String, Vec<String>>,
    /// Context tag -> apology text; the `default` key replaces the generic one.
    #[serde(default)]
    pub fallback_messages: HashMap<String, String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub context_prompts: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Background sweep period; 0 disables sweeping.
    #[serde(default = "default_sweep_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            sweep_interval_secs: default_sweep_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

/// Per-provider retry override; unset fields inherit the top-level `retry` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOverride {
    pub max_attempts: Option<u32>,
    pub base_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

/// Parameters used for chat-layer requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSection {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    /// Lower first; ties keep declaration order.
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// 0 = unlimited.
    #[serde(default)]
    pub requests_per_minute: u32,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub retry: Option<RetryOverride>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("priority", &self.priority)
            .field("timeout_ms", &self.timeout_ms)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ProviderConfig {
    /// `NAME` part of the derived environment variables.
    pub fn env_name(&self) -> String {
        self.name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.kind.default_model())
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }

    pub fn retry_policy(&self, defaults: &RetrySection) -> RetryPolicy {
        let o = self.retry.clone().unwrap_or_default();
        RetrySection {
            max_attempts: o.max_attempts.unwrap_or(defaults.max_attempts),
            base_backoff_ms: o.base_backoff_ms.unwrap_or(defaults.base_backoff_ms),
            max_backoff_ms: o.max_backoff_ms.unwrap_or(defaults.max_backoff_ms),
        }
        .policy()
    }

    pub fn resolve_api_key<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(k) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(k.clone());
        }
        if let Some(var) = &self.api_key_env {
            if let Some(k) = lookup(var).filter(|k| !k.is_empty()) {
                return Some(k);
            }
        }
        lookup(&format!("{}_API_KEY", self.env_name())).filter(|k| !k.is_empty())
    }

    pub fn spec(&self, defaults: &RetrySection) -> ProviderSpec {
        ProviderSpec::new(self.name.clone())
            .with_priority(self.priority)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_retry(self.retry_policy(defaults))
            .with_requests_per_minute(self.requests_per_minute)
    }
}

fn config_error(message: impl Into<String>, field: impl Into<String>) -> Error {
    Error::configuration_with_context(
        message,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("config_validator"),
    )
}

fn parse_env<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        Error::configuration_with_context(
            format!("invalid value '{}' for {}", raw, var),
            ErrorContext::new()
                .with_field_path(var)
                .with_source("env_override"),
        )
    })
}

impl RelayConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Apply `AI_RELAY_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|k| std::env::var(k).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        const DEADLINE: &str = "AI_RELAY_DEADLINE_MS";
        const TTL: &str = "AI_RELAY_CACHE_TTL_SECS";
        const MAX_ENTRIES: &str = "AI_RELAY_CACHE_MAX_ENTRIES";
        const ATTEMPTS: &str = "AI_RELAY_RETRY_MAX_ATTEMPTS";
        const BASE: &str = "AI_RELAY_RETRY_BASE_MS";
        const MAX: &str = "AI_RELAY_RETRY_MAX_MS";

        if let Some(v) = lookup(DEADLINE) {
            self.deadline_ms = parse_env(DEADLINE, &v)?;
        }
        if let Some(v) = lookup(TTL) {
            self.cache.ttl_secs = parse_env(TTL, &v)?;
        }
        if let Some(v) = lookup(MAX_ENTRIES) {
            self.cache.max_entries = parse_env(MAX_ENTRIES, &v)?;
        }
        if let Some(v) = lookup(ATTEMPTS) {
            self.retry.max_attempts = parse_env(ATTEMPTS, &v)?;
        }
        if let Some(v) = lookup(BASE) {
            self.retry.base_backoff_ms = parse_env(BASE, &v)?;
        }
        if let Some(v) = lookup(MAX) {
            self.retry.max_backoff_ms = parse_env(MAX, &v)?;
        }
        for p in &mut self.providers {
            let var = format!("AI_RELAY_{}_RPM", p.env_name());
            if let Some(v) = lookup(&var) {
                p.requests_per_minute = parse_env(&var, &v)?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(config_error("at least one provider is required", "providers"));
        }
        if self.deadline_ms == 0 {
            return Err(config_error("deadline must be positive", "deadline_ms"));
        }
        if self.cache.max_entries == 0 {
            return Err(config_error("must be at least 1", "cache.max_entries"));
        }
        if self.cache.ttl_secs == 0 {
            return Err(config_error("must be positive", "cache.ttl_secs"));
        }
        validate_retry(
            self.retry.max_attempts,
            self.retry.base_backoff_ms,
            self.retry.max_backoff_ms,
            "retry",
        )?;

        let mut names = HashSet::new();
        for (i, p) in self.providers.iter().enumerate() {
            let at = format!("providers[{}]", i);
            if p.name.trim().is_empty() {
                return Err(config_error("name must not be empty", format!("{}.name", at)));
            }
            if !names.insert(p.name.as_str()) {
                return Err(config_error(
                    format!("duplicate provider name '{}'", p.name),
                    format!("{}.name", at),
                ));
            }
            if p.timeout_ms == 0 {
                return Err(config_error("must be positive", format!("{}.timeout_ms", at)));
            }
            if let Some(base) = &p.base_url {
                match url::Url::parse(base) {
                    Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                    _ => {
                        return Err(config_error(
                            format!("'{}' is not an http(s) URL", base),
                            format!("{}.base_url", at),
                        ))
                    }
                }
            }
            let policy = p.retry_policy(&self.retry);
            validate_retry(
                policy.max_attempts,
                policy.base_backoff.as_millis() as u64,
                policy.max_backoff.as_millis() as u64,
                &format!("{}.retry", at),
            )?;
        }

        for (context, targets) in &self.routes {
            if targets.is_empty() {
                return Err(config_error(
                    "route lists no providers",
                    format!("routes.{}", context),
                ));
            }
            if let Some(unknown) = targets.iter().find(|t| !names.contains(t.as_str())) {
                return Err(config_error(
                    format!("unknown provider '{}'", unknown),
                    format!("routes.{}", context),
                ));
            }
        }
        Ok(())
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_enabled(self.cache.enabled)
            .with_ttl(Duration::from_secs(self.cache.ttl_secs))
            .with_max_entries(self.cache.max_entries)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.cache.enabled && self.cache.sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.cache.sweep_interval_secs))
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams::new()
            .temperature(self.generation.temperature)
            .max_output_tokens(self.generation.max_output_tokens)
    }

    pub fn template(&self) -> ContextTemplate {
        ContextTemplate::new(
            self.system_prompt
                .as_deref()
                .unwrap_or(DEFAULT_SYSTEM_PROMPT),
        )
        .with_context_prompts(self.context_prompts.clone())
    }

    /// Validate, then construct the HTTP adapters and the orchestrator.
    pub fn build_orchestrator(&self) -> Result<Orchestrator<Provider>> {
        self.build_orchestrator_with(|k| std::env::var(k).ok())
    }

    pub fn build_orchestrator_with<F>(&self, lookup: F) -> Result<Orchestrator<Provider>>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.validate()?;

        let mut builder = Orchestrator::builder()
            .with_deadline(self.deadline())
            .with_cache(self.cache_config())
            .with_fallback_messages(FallbackMessages::from_map(self.fallback_messages.clone()))
            .with_template(std::sync::Arc::new(self.template()))
            .with_default_params(self.generation_params());

        for p in &self.providers {
            let api_key = p.resolve_api_key(&lookup);
            if api_key.is_none() {
                warn!(provider = %p.name, "no API key configured; calls will fail as invalid");
            }
            let timeout = Duration::from_millis(p.timeout_ms);
            let adapter: Provider = match p.kind {
                ProviderKind::OpenAi => {
                    OpenAiAdapter::new(p.name.clone(), p.model(), p.base_url(), api_key, timeout)?
                        .into()
                }
                ProviderKind::Gemini => {
                    GeminiAdapter::new(p.name.clone(), p.model(), p.base_url(), api_key, timeout)?
                        .into()
                }
            };
            builder = builder.with_provider(p.spec(&self.retry), adapter);
        }
        for (context, targets) in &self.routes {
            builder = builder.with_route(context.clone(), targets.iter().cloned());
        }
        builder.build()
    }
}

fn validate_retry(max_attempts: u32, base_ms: u64, max_ms: u64, at: &str) -> Result<()> {
    if max_attempts == 0 {
        return Err(config_error(
            "must be at least 1",
            format!("{}.max_attempts", at),
        ));
    }
    if base_ms > max_ms {
        return Err(config_error(
            format!("base backoff {}ms exceeds max backoff {}ms", base_ms, max_ms),
            format!("{}.base_backoff_ms", at),
        ));
    }
    Ok(())
}
