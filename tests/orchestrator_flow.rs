//! Orchestrator behaviour against scripted in-process providers.

use ai_relay::orchestrator::{FallbackMessages, Orchestrator, PlainTemplate, UserInfo};
use ai_relay::provider::{ProviderAdapter, ProviderError, ProviderErrorKind, ProviderSpec};
use ai_relay::resilience::RetryPolicy;
use ai_relay::types::{GenerationParams, GenerationRequest, Prompt, ResultSource};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Responder = dyn Fn(&Prompt, u32) -> Result<String, ProviderError> + Send + Sync;

/// Provider whose reply is computed from the prompt and the 1-based call number.
struct Scripted {
    name: &'static str,
    delay: Duration,
    calls: Arc<AtomicU32>,
    respond: Box<Responder>,
}

#[async_trait]
impl ProviderAdapter for Scripted {
    async fn generate(
        &self,
        prompt: &Prompt,
        _params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(prompt, n)
    }

    fn identify(&self) -> &str {
        self.name
    }
}

fn scripted<F>(name: &'static str, f: F) -> (Scripted, Arc<AtomicU32>)
where
    F: Fn(&Prompt, u32) -> Result<String, ProviderError> + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicU32::new(0));
    (
        Scripted {
            name,
            delay: Duration::ZERO,
            calls: calls.clone(),
            respond: Box::new(f),
        },
        calls,
    )
}

fn slow(mut p: Scripted, delay: Duration) -> Scripted {
    p.delay = delay;
    p
}

fn ok(text: &'static str) -> impl Fn(&Prompt, u32) -> Result<String, ProviderError> {
    move |_, _| Ok(text.to_string())
}

fn echo(name: &'static str) -> impl Fn(&Prompt, u32) -> Result<String, ProviderError> {
    move |p, _| Ok(format!("{}:{}", name, p.user))
}

fn failing(
    name: &'static str,
    kind: ProviderErrorKind,
) -> impl Fn(&Prompt, u32) -> Result<String, ProviderError> {
    move |_, n| Err(ProviderError::new(name, kind, format!("call {}", n)))
}

fn spec(name: &str, priority: u32) -> ProviderSpec {
    ProviderSpec::new(name)
        .with_priority(priority)
        .with_timeout(Duration::from_secs(30))
        .with_retry(RetryPolicy::new(
            3,
            Duration::from_millis(100),
            Duration::from_secs(2),
        ))
}

fn request(text: &str) -> GenerationRequest {
    GenerationRequest::new(Prompt::user(text), GenerationParams::new().temperature(0.7))
}

#[tokio::test]
async fn test_success_then_served_from_cache() {
    let (primary, primary_calls) = scripted("primary", ok("answer-1"));
    let (secondary, secondary_calls) = scripted("secondary", ok("answer-2"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .with_provider(spec("secondary", 1), secondary)
        .build()
        .unwrap();

    let first = relay.generate(&request("Explain X")).await;
    assert_eq!(first.content, "answer-1");
    assert_eq!(first.provider_used, "primary");
    assert_eq!(first.source, ResultSource::Provider);
    assert_eq!(first.attempts, 1);
    assert!(!first.cached);
    assert!(first.error_trail.is_empty());

    let second = relay.generate(&request("Explain X")).await;
    assert_eq!(second.content, "answer-1");
    assert_eq!(second.provider_used, "cache");
    assert_eq!(second.attempts, 0);
    assert!(second.cached);
    assert_ne!(first.request_id, second.request_id);

    assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_identity_does_not_partition_cache() {
    let (primary, calls) = scripted("primary", ok("shared"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .build()
        .unwrap();

    let a = relay.generate(&request("q").with_identity("alice")).await;
    let b = relay.generate(&request("q").with_identity("bob")).await;
    assert_eq!(a.source, ResultSource::Provider);
    assert_eq!(b.source, ResultSource::Cache);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_quota_falls_back_without_retry() {
    let (primary, primary_calls) =
        scripted("primary", failing("primary", ProviderErrorKind::QuotaExceeded));
    let (secondary, secondary_calls) = scripted("secondary", ok("from-secondary"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .with_provider(spec("secondary", 1), secondary)
        .build()
        .unwrap();

    let result = relay.generate(&request("q")).await;
    assert_eq!(result.content, "from-secondary");
    assert_eq!(result.provider_used, "secondary");
    assert_eq!(result.attempts, 2);
    assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);

    assert_eq!(result.error_trail.len(), 1);
    assert_eq!(result.error_trail[0].provider, "primary");
    assert_eq!(
        result.error_trail[0].kind,
        Some(ProviderErrorKind::QuotaExceeded)
    );
}

#[tokio::test]
async fn test_invalid_falls_back_without_retry() {
    let (primary, primary_calls) =
        scripted("primary", failing("primary", ProviderErrorKind::Invalid));
    let (secondary, _) = scripted("secondary", ok("ok"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .with_provider(spec("secondary", 1), secondary)
        .build()
        .unwrap();

    let result = relay.generate(&request("q")).await;
    assert_eq!(result.provider_used, "secondary");
    assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_exhausts_budget_then_falls_back() {
    let (primary, primary_calls) =
        scripted("primary", failing("primary", ProviderErrorKind::Transient));
    let (secondary, secondary_calls) = scripted("secondary", ok("recovered"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .with_provider(spec("secondary", 1), secondary)
        .build()
        .unwrap();

    let result = relay.generate(&request("q")).await;
    assert_eq!(result.content, "recovered");
    assert_eq!(primary_calls.load(Ordering::SeqCst), 3);
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.attempts, 4);

    let attempts: Vec<u32> = result.error_trail.iter().map(|f| f.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    // 100ms + 200ms of backoff on the primary.
    assert!(result.latency_ms >= 300);
}

#[tokio::test(start_paused = true)]
async fn test_transient_recovers_on_same_provider() {
    let (primary, primary_calls) = scripted("primary", |_, n| {
        if n < 3 {
            Err(ProviderError::timeout("primary", "slow"))
        } else {
            Ok("third time".to_string())
        }
    });
    let (secondary, secondary_calls) = scripted("secondary", ok("unused"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .with_provider(spec("secondary", 1), secondary)
        .build()
        .unwrap();

    let result = relay.generate(&request("q")).await;
    assert_eq!(result.content, "third time");
    assert_eq!(result.provider_used, "primary");
    assert_eq!(result.attempts, 3);
    assert_eq!(result.error_trail.len(), 2);
    assert_eq!(primary_calls.load(Ordering::SeqCst), 3);
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_total_failure_returns_safe_default() {
    let (primary, primary_calls) =
        scripted("primary", failing("primary", ProviderErrorKind::Invalid));
    let (secondary, _) =
        scripted("secondary", failing("secondary", ProviderErrorKind::QuotaExceeded));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .with_provider(spec("secondary", 1), secondary)
        .with_fallback_messages(
            FallbackMessages::new().with_message("support", "Support is busy, try later."),
        )
        .build()
        .unwrap();

    let result = relay.generate(&request("q")).await;
    assert_eq!(result.provider_used, "none");
    assert_eq!(result.source, ResultSource::Fallback);
    assert!(!result.content.trim().is_empty());
    assert_eq!(result.error_trail.len(), 2);

    let support = relay.generate(&request("q").with_context("support")).await;
    assert_eq!(support.content, "Support is busy, try later.");

    // Fallback text is never cached.
    relay.generate(&request("q")).await;
    assert_eq!(primary_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rate_denial_skips_provider() {
    let (primary, primary_calls) = scripted("primary", echo("primary"));
    let (secondary, secondary_calls) = scripted("secondary", echo("secondary"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0).with_requests_per_minute(1), primary)
        .with_provider(spec("secondary", 1), secondary)
        .build()
        .unwrap();

    let a = relay.generate(&request("a")).await;
    let b = relay.generate(&request("b")).await;
    assert_eq!(a.content, "primary:a");
    assert_eq!(b.content, "secondary:b");
    assert_eq!(b.attempts, 1);
    assert_eq!(b.error_trail.len(), 1);
    assert!(b.error_trail[0].is_rate_denial());
    assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);

    let stats = relay.stats().await;
    assert_eq!(stats.providers[0].rate_denials, 1);
    assert_eq!(stats.providers[0].window.as_ref().unwrap().in_window, 1);

    relay.reset_rate_limits();
    let c = relay.generate(&request("c")).await;
    assert_eq!(c.content, "primary:c");
}

#[tokio::test(start_paused = true)]
async fn test_rate_window_reopens_after_a_minute() {
    let (primary, _) = scripted("primary", echo("primary"));
    let (secondary, _) = scripted("secondary", echo("secondary"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0).with_requests_per_minute(1), primary)
        .with_provider(spec("secondary", 1), secondary)
        .build()
        .unwrap();

    assert_eq!(relay.generate(&request("a")).await.provider_used, "primary");
    assert_eq!(relay.generate(&request("b")).await.provider_used, "secondary");
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(relay.generate(&request("c")).await.provider_used, "primary");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_respect_rate_ceiling() {
    let (primary, primary_calls) = scripted("primary", echo("primary"));
    let (secondary, secondary_calls) = scripted("secondary", echo("secondary"));
    let relay = Arc::new(
        Orchestrator::builder()
            .with_provider(spec("primary", 0).with_requests_per_minute(5), primary)
            .with_provider(spec("secondary", 1), secondary)
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let relay = relay.clone();
            tokio::spawn(async move { relay.generate(&request(&format!("q{}", i))).await })
        })
        .collect();
    for h in handles {
        assert_ne!(h.await.unwrap().provider_used, "none");
    }
    assert_eq!(primary_calls.load(Ordering::SeqCst), 5);
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 7);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_the_whole_call() {
    let (primary, primary_calls) = scripted("primary", ok("too late"));
    let primary = slow(primary, Duration::from_secs(20));
    let (secondary, secondary_calls) = scripted("secondary", ok("never reached"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .with_provider(spec("secondary", 1), secondary)
        .with_deadline(Duration::from_secs(2))
        .build()
        .unwrap();

    let result = relay.generate(&request("q")).await;
    assert_eq!(result.provider_used, "none");
    assert!(result.latency_ms <= 2_000);
    assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        result.error_trail[0].kind,
        Some(ProviderErrorKind::Timeout)
    );
}

#[tokio::test(start_paused = true)]
async fn test_per_call_timeout_is_retried_as_timeout() {
    let (primary, primary_calls) = scripted("primary", ok("late"));
    let primary = slow(primary, Duration::from_secs(5));
    let (secondary, _) = scripted("secondary", ok("fast"));
    let relay = Orchestrator::builder()
        .with_provider(
            spec("primary", 0)
                .with_timeout(Duration::from_secs(1))
                .with_retry(RetryPolicy::new(
                    2,
                    Duration::from_millis(10),
                    Duration::from_millis(10),
                )),
            primary,
        )
        .with_provider(spec("secondary", 1), secondary)
        .build()
        .unwrap();

    let result = relay.generate(&request("q")).await;
    assert_eq!(result.content, "fast");
    assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
    assert!(result
        .error_trail
        .iter()
        .all(|f| f.kind == Some(ProviderErrorKind::Timeout)));
}

#[tokio::test(start_paused = true)]
async fn test_identical_concurrent_requests_share_one_call() {
    let (primary, calls) = scripted("primary", ok("shared answer"));
    let primary = slow(primary, Duration::from_millis(200));
    let relay = Arc::new(
        Orchestrator::builder()
            .with_provider(spec("primary", 0), primary)
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let relay = relay.clone();
            tokio::spawn(async move { relay.generate(&request("same")).await })
        })
        .collect();

    let mut sources = Vec::new();
    for h in handles {
        let r = h.await.unwrap();
        assert_eq!(r.content, "shared answer");
        sources.push(r.source);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        sources.iter().filter(|s| **s == ResultSource::Provider).count(),
        1
    );
    assert_eq!(
        sources.iter().filter(|s| **s == ResultSource::Coalesced).count(),
        4
    );
    assert_eq!(relay.stats().await.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_leader_lets_followers_try_themselves() {
    let (primary, calls) = scripted("primary", |_, n| {
        if n == 1 {
            Err(ProviderError::invalid("primary", "first call rejected"))
        } else {
            Ok("second wind".to_string())
        }
    });
    let primary = slow(primary, Duration::from_millis(100));
    let relay = Arc::new(
        Orchestrator::builder()
            .with_provider(spec("primary", 0), primary)
            .build()
            .unwrap(),
    );

    let leader = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.generate(&request("same")).await })
    };
    tokio::task::yield_now().await;
    let follower = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.generate(&request("same")).await })
    };

    let leader = leader.await.unwrap();
    let follower = follower.await.unwrap();
    assert_eq!(leader.source, ResultSource::Fallback);
    assert_eq!(follower.source, ResultSource::Provider);
    assert_eq!(follower.content, "second wind");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_single_flight_can_be_disabled() {
    let (primary, calls) = scripted("primary", ok("x"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .with_single_flight(false)
        .build()
        .unwrap();
    relay.generate(&request("q")).await;
    assert_eq!(relay.generate(&request("q")).await.source, ResultSource::Cache);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_context_route_overrides_priority() {
    let (primary, primary_calls) = scripted("primary", echo("primary"));
    let (secondary, secondary_calls) = scripted("secondary", echo("secondary"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .with_provider(spec("secondary", 1), secondary)
        .with_route("support", ["secondary"])
        .build()
        .unwrap();

    let routed = relay.generate(&request("q").with_context("support")).await;
    assert_eq!(routed.content, "secondary:q");
    let default = relay.generate(&request("other")).await;
    assert_eq!(default.content, "primary:other");
    assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_batch_preserves_order() {
    let (primary, calls) = scripted("primary", echo("p"));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .build()
        .unwrap();

    let requests: Vec<_> = (0..6).map(|i| request(&format!("m{}", i))).collect();
    let results = relay.generate_batch(requests, 3).await;
    let contents: Vec<_> = results.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["p:m0", "p:m1", "p:m2", "p:m3", "p:m4", "p:m5"]);
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert!(relay.generate_batch(Vec::new(), 3).await.is_empty());
}

#[tokio::test]
async fn test_respond_uses_template_and_clear_cache() {
    let (primary, calls) = scripted("primary", |p, _| Ok(format!("echo {}", p.user)));
    let relay = Orchestrator::builder()
        .with_provider(spec("primary", 0), primary)
        .with_template(Arc::new(PlainTemplate))
        .build()
        .unwrap();

    let info = UserInfo::new();
    let r = relay.respond("u1", "hello", "general", &info).await;
    assert_eq!(r.content, "echo hello");
    assert!(relay.respond("u2", "hello", "general", &info).await.cached);

    relay.clear_cache().await;
    assert!(!relay.respond("u3", "hello", "general", &info).await.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stats = relay.stats().await;
    assert_eq!(stats.providers[0].calls, 2);
    assert_eq!(stats.providers[0].successes, 2);
    assert_eq!(stats.cache.hits, 1);
    assert_eq!(stats.cache_entries, 1);
}
