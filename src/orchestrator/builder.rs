use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::fallback::FallbackMessages;
use super::singleflight::SingleFlight;
use super::template::{ContextTemplate, PromptTemplate};
use super::{Orchestrator, ProviderSlot};
use crate::cache::{CacheConfig, ResponseCache};
use crate::error::{Error, ErrorContext};
use crate::provider::{Provider, ProviderAdapter, ProviderSpec};
use crate::resilience::rate_limiter::RateLimiter;
use crate::types::GenerationParams;
use crate::Result;

/// Overall per-call deadline covering cache, rate checks, retries and fallback.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(45);

/// Builder for an [`Orchestrator`].
///
/// Providers are tried in ascending `priority`; equal priorities keep the order in
/// which they were added.
pub struct OrchestratorBuilder<P = Provider> {
    providers: Vec<(ProviderSpec, P)>,
    cache: CacheConfig,
    deadline: Duration,
    routes: HashMap<String, Vec<String>>,
    fallbacks: FallbackMessages,
    template: Arc<dyn PromptTemplate>,
    default_params: GenerationParams,
    single_flight: bool,
}

impl<P: ProviderAdapter> Default for OrchestratorBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ProviderAdapter> OrchestratorBuilder<P> {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            cache: CacheConfig::default(),
            deadline: DEFAULT_DEADLINE,
            routes: HashMap::new(),
            fallbacks: FallbackMessages::default(),
            template: Arc::new(ContextTemplate::default()),
            default_params: GenerationParams::default(),
            single_flight: true,
        }
    }

    /// Add a provider. `spec.name` must equal `adapter.identify()`.
    pub fn with_provider(mut self, spec: ProviderSpec, adapter: P) -> Self {
        self.providers.push((spec, adapter));
        self
    }

    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Provider order for one context tag, overriding priority order for that tag.
    pub fn with_route<I, S>(mut self, context: impl Into<String>, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routes.insert(
            context.into(),
            providers.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn with_fallback_messages(mut self, fallbacks: FallbackMessages) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn with_template(mut self, template: Arc<dyn PromptTemplate>) -> Self {
        self.template = template;
        self
    }

    /// Parameters used by [`Orchestrator::respond`].
    pub fn with_default_params(mut self, params: GenerationParams) -> Self {
        self.default_params = params;
        self
    }

    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    pub fn build(self) -> Result<Orchestrator<P>> {
        if self.providers.is_empty() {
            return Err(Error::configuration_with_context(
                "at least one provider is required",
                ErrorContext::new().with_field_path("providers"),
            ));
        }

        let mut seen = HashSet::new();
        for (i, (spec, adapter)) in self.providers.iter().enumerate() {
            if spec.name != adapter.identify() {
                return Err(Error::configuration_with_context(
                    format!(
                        "provider spec '{}' does not match adapter '{}'",
                        spec.name,
                        adapter.identify()
                    ),
                    ErrorContext::new().with_field_path(format!("providers[{}].name", i)),
                ));
            }
            if !seen.insert(spec.name.clone()) {
                return Err(Error::configuration_with_context(
                    format!("duplicate provider name '{}'", spec.name),
                    ErrorContext::new().with_field_path(format!("providers[{}].name", i)),
                ));
            }
        }

        let mut providers = self.providers;
        providers.sort_by_key(|(spec, _)| spec.priority);

        let limiter = RateLimiter::new();
        let slots: Vec<ProviderSlot<P>> = providers
            .into_iter()
            .map(|(spec, adapter)| {
                limiter.register(spec.name.clone(), spec.requests_per_minute);
                ProviderSlot::new(spec, adapter)
            })
            .collect();

        let index: HashMap<&str, usize> = slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.spec.name.as_str(), i))
            .collect();
        let mut routes = HashMap::with_capacity(self.routes.len());
        for (context, names) in self.routes {
            let mut order = Vec::with_capacity(names.len());
            for name in &names {
                let Some(&i) = index.get(name.as_str()) else {
                    return Err(Error::configuration_with_context(
                        format!("route '{}' names unknown provider '{}'", context, name),
                        ErrorContext::new().with_field_path(format!("routes.{}", context)),
                    ));
                };
                if !order.contains(&i) {
                    order.push(i);
                }
            }
            if order.is_empty() {
                return Err(Error::configuration_with_context(
                    format!("route '{}' lists no providers", context),
                    ErrorContext::new().with_field_path(format!("routes.{}", context)),
                ));
            }
            routes.insert(context, order);
        }
        let default_order = (0..slots.len()).collect();

        Ok(Orchestrator {
            slots,
            default_order,
            routes,
            cache: Arc::new(ResponseCache::from_config(self.cache)),
            limiter,
            flights: SingleFlight::new(),
            single_flight: self.single_flight,
            deadline: self.deadline,
            fallbacks: self.fallbacks,
            template: self.template,
            default_params: self.default_params,
            sweepers: Mutex::new(Vec::new()),
        })
    }
}
