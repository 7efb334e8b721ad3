//! # Orchestrator
//!
//! Turns one [`GenerationRequest`] into one [`GenerationResult`], always.
//!
//! ```text
//! CacheCheck ──hit──────────────────────────────────────────────▶ Success (cache)
//!     │miss
//!     ▼
//! RateCheck(i) ──denied──▶ NextProvider ──none left──▶ AllFailed (fallback text)
//!     │admitted               ▲
//!     ▼                       │ exhausted / non-retryable
//! Calling(i) [retry policy] ──┘
//!     │ok
//!     ▼
//! store in cache ──────────────────────────────────────────────▶ Success (provider)
//! ```
//!
//! | Piece | Role |
//! |-------|------|
//! | [`OrchestratorBuilder`] | Providers, routes, cache, deadline, fallback text, template |
//! | [`FallbackMessages`] | Apology per context tag when every provider fails |
//! | [`PromptTemplate`] | Renders `(message, context, user_info)` into a prompt |
//! | [`SingleFlight`] | Shares one upstream traversal between identical concurrent calls |
//!
//! Provider order is fixed per call: the context's route if one is configured,
//! otherwise ascending priority. A rate denial or an exhausted provider moves on to
//! the next one; nothing is ever retried across providers.

mod builder;
mod fallback;
mod singleflight;
mod template;

pub use builder::{OrchestratorBuilder, DEFAULT_DEADLINE};
pub use fallback::{FallbackMessages, DEFAULT_APOLOGY};
pub use singleflight::{Flight, FlightGuard, FlightWaiter, SingleFlight};
pub use template::{ContextTemplate, PlainTemplate, PromptTemplate, UserInfo, DEFAULT_SYSTEM_PROMPT};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

use crate::cache::{fingerprint, CacheKey, CacheStats, ResponseCache};
use crate::provider::{Provider, ProviderAdapter, ProviderSpec};
use crate::resilience::rate_limiter::{RateLimiter, RateWindowSnapshot};
use crate::types::{
    AttemptFailure, GenerationParams, GenerationRequest, GenerationResult, ResultSource,
    PROVIDER_CACHE, PROVIDER_NONE,
};

/// Stand-in for deadlines too large to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

#[derive(Debug, Default)]
struct ProviderCounters {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rate_denials: AtomicU64,
}

struct ProviderSlot<P> {
    spec: ProviderSpec,
    adapter: P,
    counters: ProviderCounters,
}

impl<P> ProviderSlot<P> {
    fn new(spec: ProviderSpec, adapter: P) -> Self {
        Self {
            spec,
            adapter,
            counters: ProviderCounters::default(),
        }
    }
}

/// Per-provider counters plus current rate-window usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStats {
    pub name: String,
    pub priority: u32,
    /// Admitted traversals (each may contain several attempts).
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub rate_denials: u64,
    pub window: Option<RateWindowSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorStats {
    pub cache: CacheStats,
    pub cache_entries: usize,
    pub in_flight: usize,
    pub providers: Vec<ProviderStats>,
}

/// What one pass over the provider order produced.
struct Traversal {
    success: Option<(String, String)>,
    attempts: u32,
    trail: Vec<AttemptFailure>,
}

/// Multi-provider generation with caching, rate limiting, retry and fallback.
///
/// All shared state (cache, rate windows, in-flight table) is owned here and
/// synchronised internally, so one instance can serve any number of concurrent
/// tasks behind an `Arc`.
pub struct Orchestrator<P = Provider> {
    slots: Vec<ProviderSlot<P>>,
    default_order: Vec<usize>,
    routes: HashMap<String, Vec<usize>>,
    cache: Arc<ResponseCache>,
    limiter: RateLimiter,
    flights: SingleFlight,
    single_flight: bool,
    deadline: Duration,
    fallbacks: FallbackMessages,
    template: Arc<dyn PromptTemplate>,
    default_params: GenerationParams,
    sweepers: Mutex<Vec<AbortHandle>>,
}

impl<P: ProviderAdapter> Orchestrator<P> {
    pub fn builder() -> OrchestratorBuilder<P> {
        OrchestratorBuilder::new()
    }

    /// Generate text for `request`. Never fails; on total failure the content is the
    /// context's apology and `provider_used` is `"none"`.
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let request_id = uuid::Uuid::new_v4().to_string();
        let key = fingerprint(request.prompt(), request.params());
        let span = tracing::info_span!(
            "generate",
            request_id = %request_id,
            identity = request.identity(),
            context = request.context(),
            cache_key = key.short(),
        );
        self.generate_keyed(request, key, request_id)
            .instrument(span)
            .await
    }

    /// Chat-layer entry point: render `message` through the prompt template, then
    /// generate with the default parameters.
    pub async fn respond(
        &self,
        identity: &str,
        message: &str,
        context: &str,
        user_info: &UserInfo,
    ) -> GenerationResult {
        let prompt = self.template.render(message, context, user_info);
        let request = GenerationRequest::new(prompt, self.default_params.clone())
            .with_context(context)
            .with_identity(identity);
        self.generate(&request).await
    }

    /// Run many requests with at most `concurrency` in flight. Results keep input order.
    pub async fn generate_batch(
        &self,
        requests: Vec<GenerationRequest>,
        concurrency: usize,
    ) -> Vec<GenerationResult> {
        use futures::StreamExt;

        if requests.is_empty() {
            return Vec::new();
        }
        let limit = concurrency.max(1);

        let mut results: Vec<(usize, GenerationResult)> =
            futures::stream::iter(requests.iter().enumerate())
                .map(|(idx, req)| async move { (idx, self.generate(req).await) })
                .buffer_unordered(limit)
                .collect()
                .await;
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, r)| r).collect()
    }

    async fn generate_keyed(
        &self,
        request: &GenerationRequest,
        key: CacheKey,
        request_id: String,
    ) -> GenerationResult {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.deadline)
            .unwrap_or(started + FAR_FUTURE);

        if let Some(text) = self.cache.lookup(&key).await {
            return self.shared(request_id, text, ResultSource::Cache, started);
        }

        if !self.single_flight {
            let traversal = self.traverse(request, deadline).await;
            return self.settle(request, &key, request_id, traversal, started).await;
        }

        match self.flights.begin(&key) {
            Flight::Leader(guard) => {
                // Another leader may have stored the answer between our lookup and begin().
                if let Some(text) = self.cache.peek(&key).await {
                    guard.complete(Some(text.clone()));
                    return self.shared(request_id, text, ResultSource::Cache, started);
                }
                let traversal = self.traverse(request, deadline).await;
                let shared = traversal.success.as_ref().map(|(text, _)| text.clone());
                let result = self.settle(request, &key, request_id, traversal, started).await;
                guard.complete(shared);
                result
            }
            Flight::Follower(waiter) => {
                debug!("joining in-flight generation");
                match tokio::time::timeout_at(deadline, waiter.wait()).await {
                    Ok(Some(text)) => {
                        self.shared(request_id, text, ResultSource::Coalesced, started)
                    }
                    Ok(None) => {
                        debug!("in-flight generation produced nothing, running independently");
                        let traversal = self.traverse(request, deadline).await;
                        self.settle(request, &key, request_id, traversal, started).await
                    }
                    Err(_) => {
                        let traversal = Traversal {
                            success: None,
                            attempts: 0,
                            trail: Vec::new(),
                        };
                        self.settle(request, &key, request_id, traversal, started).await
                    }
                }
            }
        }
    }

    /// Walk the provider order once, stopping at the first success.
    async fn traverse(&self, request: &GenerationRequest, deadline: Instant) -> Traversal {
        let mut attempts = 0;
        let mut trail = Vec::new();

        for &idx in self.order_for(request.context()) {
            if Instant::now() >= deadline {
                break;
            }
            let slot = &self.slots[idx];
            let name = slot.spec.name.as_str();

            if !self.limiter.admit(name) {
                slot.counters.rate_denials.fetch_add(1, Ordering::Relaxed);
                warn!(provider = name, "rate limit window full, skipping provider");
                trail.push(AttemptFailure::rate_limited(name));
                continue;
            }
            debug!(provider = name, "rate limit admitted");
            slot.counters.calls.fetch_add(1, Ordering::Relaxed);

            let outcome = slot
                .spec
                .retry
                .execute(name, slot.spec.timeout, deadline, || {
                    slot.adapter.generate(request.prompt(), request.params())
                })
                .await;
            attempts += outcome.attempts;
            trail.extend(outcome.failures);

            match outcome.result {
                Ok(text) => {
                    slot.counters.successes.fetch_add(1, Ordering::Relaxed);
                    return Traversal {
                        success: Some((text, slot.adapter.identify().to_string())),
                        attempts,
                        trail,
                    };
                }
                Err(err) => {
                    slot.counters.failures.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        provider = name,
                        error_kind = err.kind.name(),
                        "falling back to next provider"
                    );
                }
            }
        }

        Traversal {
            success: None,
            attempts,
            trail,
        }
    }

    /// Store a success in the cache, or resolve a failure to the apology text.
    async fn settle(
        &self,
        request: &GenerationRequest,
        key: &CacheKey,
        request_id: String,
        traversal: Traversal,
        started: Instant,
    ) -> GenerationResult {
        let Traversal {
            success,
            attempts,
            trail,
        } = traversal;

        match success {
            Some((text, provider)) => {
                self.cache.store(key, &text).await;
                let result = self.finish(
                    request_id,
                    text,
                    &provider,
                    ResultSource::Provider,
                    attempts,
                    started,
                    trail,
                );
                info!(
                    provider = %result.provider_used,
                    attempts,
                    latency_ms = result.latency_ms,
                    "generation succeeded"
                );
                result
            }
            None => {
                let deadline_hit = started.elapsed() >= self.deadline;
                let content = self.fallbacks.message_for(request.context()).to_string();
                let result = self.finish(
                    request_id,
                    content,
                    PROVIDER_NONE,
                    ResultSource::Fallback,
                    attempts,
                    started,
                    trail,
                );
                error!(
                    attempts,
                    latency_ms = result.latency_ms,
                    deadline_exhausted = deadline_hit,
                    trail = %format_trail(&result.error_trail),
                    "all providers failed, returning fallback text"
                );
                result
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        request_id: String,
        content: String,
        provider_used: &str,
        source: ResultSource,
        attempts: u32,
        started: Instant,
        error_trail: Vec<AttemptFailure>,
    ) -> GenerationResult {
        GenerationResult {
            request_id,
            content,
            provider_used: provider_used.to_string(),
            source,
            cached: source.is_cached(),
            attempts,
            latency_ms: started.elapsed().as_millis() as u64,
            error_trail,
        }
    }

    /// Result for text this call did not generate itself.
    fn shared(
        &self,
        request_id: String,
        text: String,
        source: ResultSource,
        started: Instant,
    ) -> GenerationResult {
        self.finish(request_id, text, PROVIDER_CACHE, source, 0, started, Vec::new())
    }

    fn order_for(&self, context: &str) -> &[usize] {
        self.routes
            .get(context)
            .map(Vec::as_slice)
            .unwrap_or(&self.default_order)
    }

    /// Provider names in the order they would be tried for `context`.
    pub fn provider_order(&self, context: &str) -> Vec<&str> {
        self.order_for(context)
            .iter()
            .map(|&i| self.slots[i].spec.name.as_str())
            .collect()
    }

    pub async fn stats(&self) -> OrchestratorStats {
        let providers = self
            .slots
            .iter()
            .map(|slot| ProviderStats {
                name: slot.spec.name.clone(),
                priority: slot.spec.priority,
                calls: slot.counters.calls.load(Ordering::Relaxed),
                successes: slot.counters.successes.load(Ordering::Relaxed),
                failures: slot.counters.failures.load(Ordering::Relaxed),
                rate_denials: slot.counters.rate_denials.load(Ordering::Relaxed),
                window: self.limiter.snapshot(&slot.spec.name),
            })
            .collect();
        OrchestratorStats {
            cache: self.cache.stats(),
            cache_entries: self.cache.len().await,
            in_flight: self.flights.in_flight(),
            providers,
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("response cache cleared");
    }

    pub fn reset_rate_limits(&self) {
        self.limiter.reset();
        info!("rate limit windows reset");
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Periodically purge expired cache entries. Stopped by [`Orchestrator::shutdown`]
    /// or when the orchestrator is dropped.
    pub fn spawn_cache_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let period = interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let now = Instant::now();
            let first = now.checked_add(period).unwrap_or(now + FAR_FUTURE);
            let mut ticker = tokio::time::interval_at(first, period);
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        });
        self.sweepers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.abort_handle());
        handle
    }

    /// Stop background tasks. In-flight generations are unaffected.
    pub fn shutdown(&self) {
        let mut sweepers = self.sweepers.lock().unwrap_or_else(PoisonError::into_inner);
        for h in sweepers.drain(..) {
            h.abort();
        }
    }
}

impl<P> Drop for Orchestrator<P> {
    fn drop(&mut self) {
        let sweepers = self.sweepers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for h in sweepers.drain(..) {
            h.abort();
        }
    }
}

fn format_trail(trail: &[AttemptFailure]) -> String {
    trail
        .iter()
        .map(|f| match f.kind {
            Some(kind) => format!("{}#{} {}: {}", f.provider, f.attempt, kind, f.message),
            None => format!("{} rate_limited", f.provider),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
