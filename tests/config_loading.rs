//! Configuration parsing, overrides and validation.

use ai_relay::cache::fingerprint;
use ai_relay::config::RelayConfig;
use ai_relay::provider::ProviderKind;
use ai_relay::types::{GenerationParams, GenerationRequest, Prompt};
use ai_relay::Error;
use std::collections::HashMap;
use std::time::Duration;

const FULL: &str = r#"
deadline_ms: 20000
cache:
  enabled: true
  ttl_secs: 3600
  max_entries: 50
  sweep_interval_secs: 60
retry:
  max_attempts: 2
  base_backoff_ms: 250
  max_backoff_ms: 2000
generation:
  temperature: 0.4
  max_output_tokens: 512
providers:
  - name: primary
    kind: gemini
    priority: 0
    timeout_ms: 10000
    requests_per_minute: 5
    api_key_env: GEMINI_API_KEY
  - name: secondary
    kind: openai
    model: gpt-4o-mini
    priority: 1
    base_url: http://localhost:8080
    retry: { max_attempts: 4 }
routes:
  support: [secondary, primary]
fallback_messages:
  default: "We'll be right back."
  support: "Support is offline."
system_prompt: "You are a trading mentor."
context_prompts:
  academy: "Teach step by step."
"#;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |k| map.get(k).cloned()
}

fn field_path(err: &Error) -> Option<String> {
    match err {
        Error::Configuration { context, .. } => context.field_path.clone(),
        _ => None,
    }
}

#[test]
fn test_full_document_parses() {
    let cfg = RelayConfig::from_yaml_str(FULL).unwrap();
    cfg.validate().unwrap();

    assert_eq!(cfg.deadline(), Duration::from_secs(20));
    assert_eq!(cfg.sweep_interval(), Some(Duration::from_secs(60)));
    let cache = cfg.cache_config();
    assert_eq!(cache.ttl, Duration::from_secs(3600));
    assert_eq!(cache.max_entries, 50);

    assert_eq!(cfg.providers.len(), 2);
    assert_eq!(cfg.providers[0].kind, ProviderKind::Gemini);
    assert_eq!(cfg.providers[0].model(), "gemini-1.5-flash");
    assert_eq!(cfg.providers[1].model(), "gpt-4o-mini");
    assert_eq!(cfg.providers[1].base_url(), "http://localhost:8080");

    let spec = cfg.providers[1].spec(&cfg.retry);
    assert_eq!(spec.retry.max_attempts, 4);
    assert_eq!(spec.retry.base_backoff, Duration::from_millis(250));
    assert_eq!(cfg.providers[0].spec(&cfg.retry).requests_per_minute, 5);

    let params = cfg.generation_params();
    assert_eq!(params.temperature, 0.4);
    assert_eq!(params.max_output_tokens, 512);
}

#[test]
fn test_env_overrides_apply() {
    let mut cfg = RelayConfig::from_yaml_str(FULL).unwrap();
    cfg.apply_overrides_from(env(&[
        ("AI_RELAY_DEADLINE_MS", "5000"),
        ("AI_RELAY_CACHE_TTL_SECS", "60"),
        ("AI_RELAY_CACHE_MAX_ENTRIES", "10"),
        ("AI_RELAY_RETRY_MAX_ATTEMPTS", "5"),
        ("AI_RELAY_RETRY_BASE_MS", "100"),
        ("AI_RELAY_RETRY_MAX_MS", "400"),
        ("AI_RELAY_PRIMARY_RPM", "12"),
    ]))
    .unwrap();

    assert_eq!(cfg.deadline_ms, 5000);
    assert_eq!(cfg.cache.ttl_secs, 60);
    assert_eq!(cfg.cache.max_entries, 10);
    assert_eq!(cfg.retry.max_attempts, 5);
    assert_eq!(cfg.retry.base_backoff_ms, 100);
    assert_eq!(cfg.retry.max_backoff_ms, 400);
    assert_eq!(cfg.providers[0].requests_per_minute, 12);
    assert_eq!(cfg.providers[1].requests_per_minute, 0);
}

#[test]
fn test_bad_override_names_the_variable() {
    let mut cfg = RelayConfig::from_yaml_str(FULL).unwrap();
    let err = cfg
        .apply_overrides_from(env(&[("AI_RELAY_SECONDARY_RPM", "lots")]))
        .unwrap_err();
    assert_eq!(field_path(&err).as_deref(), Some("AI_RELAY_SECONDARY_RPM"));
}

#[test]
fn test_validation_reports_field_paths() {
    let cases: &[(&str, &str)] = &[
        ("providers: []\n", "providers"),
        (
            "providers:\n  - {name: a, kind: openai}\n  - {name: a, kind: gemini}\n",
            "providers[1].name",
        ),
        (
            "providers:\n  - {name: a, kind: openai, timeout_ms: 0}\n",
            "providers[0].timeout_ms",
        ),
        (
            "providers:\n  - {name: a, kind: openai, base_url: 'not a url'}\n",
            "providers[0].base_url",
        ),
        (
            "providers:\n  - {name: a, kind: openai, retry: {max_attempts: 0}}\n",
            "providers[0].retry.max_attempts",
        ),
        (
            "retry: {base_backoff_ms: 5000, max_backoff_ms: 100}\nproviders:\n  - {name: a, kind: openai}\n",
            "retry.base_backoff_ms",
        ),
        (
            "cache: {max_entries: 0}\nproviders:\n  - {name: a, kind: openai}\n",
            "cache.max_entries",
        ),
        (
            "routes: {vip: [ghost]}\nproviders:\n  - {name: a, kind: openai}\n",
            "routes.vip",
        ),
    ];

    for (yaml, expected) in cases {
        let cfg = RelayConfig::from_yaml_str(yaml).unwrap();
        let err = cfg.validate().unwrap_err();
        assert_eq!(field_path(&err).as_deref(), Some(*expected), "yaml: {}", yaml);
    }
}

#[test]
fn test_unknown_kind_is_a_yaml_error() {
    let err = RelayConfig::from_yaml_str("providers:\n  - {name: a, kind: claude}\n").unwrap_err();
    assert!(matches!(err, Error::Yaml(_)));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = RelayConfig::load("/definitely/not/here/relay.yaml").unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[tokio::test]
async fn test_build_orchestrator_uses_routes_and_priority() {
    let cfg = RelayConfig::from_yaml_str(FULL).unwrap();
    let relay = cfg
        .build_orchestrator_with(env(&[("GEMINI_API_KEY", "g-key")]))
        .unwrap();

    assert_eq!(relay.provider_order("general"), vec!["primary", "secondary"]);
    assert_eq!(relay.provider_order("support"), vec!["secondary", "primary"]);

    let stats = relay.stats().await;
    assert_eq!(stats.providers[0].window.as_ref().map(|w| w.limit), Some(5));
    assert_eq!(stats.cache_entries, 0);
}

#[tokio::test]
async fn test_build_orchestrator_rejects_invalid_config() {
    let cfg = RelayConfig::from_yaml_str("providers: []\n").unwrap();
    assert!(cfg.build_orchestrator_with(env(&[])).is_err());
}

#[tokio::test]
async fn test_extreme_durations_do_not_panic() {
    let yaml = format!(
        "deadline_ms: {max}\ncache: {{ ttl_secs: {max}, sweep_interval_secs: {max} }}\n\
         providers:\n  - {{name: a, kind: openai}}\n",
        max = u64::MAX
    );
    let cfg = RelayConfig::from_yaml_str(&yaml).unwrap();
    cfg.validate().unwrap();
    let relay = cfg.build_orchestrator_with(env(&[])).unwrap();

    let key = fingerprint(&Prompt::user("q"), &GenerationParams::new());
    relay.cache().store(&key, "kept").await;
    assert_eq!(relay.cache().lookup(&key).await.as_deref(), Some("kept"));

    if let Some(every) = cfg.sweep_interval() {
        relay.spawn_cache_sweeper(every);
    }
    // No API key: the call fails as invalid without touching the network.
    let req = GenerationRequest::new(Prompt::user("other"), GenerationParams::new());
    let result = relay.generate(&req).await;
    assert_eq!(result.provider_used, "none");
    relay.shutdown();
}
