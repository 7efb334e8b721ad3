//! ai-relay CLI: one-shot generation and configuration checks.
//!
//! Usage:
//!   ai-relay generate --config <path> [options] <message...>   Generate a reply
//!   ai-relay check-config --config <path>                      Validate configuration
//!   ai-relay version                                           Show version

use anyhow::{bail, Context};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use ai_relay::config::RelayConfig;
use ai_relay::orchestrator::UserInfo;

const DEFAULT_CONFIG: &str = "relay.yaml";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return ExitCode::FAILURE;
    }

    let rest = &args[2..];
    let outcome = match args[1].as_str() {
        "generate" => cmd_generate(rest),
        "check-config" => cmd_check_config(rest),
        "version" | "--version" | "-V" => {
            println!("ai-relay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!(
        r#"ai-relay: resilient multi-provider text generation

USAGE:
    ai-relay <COMMAND> [OPTIONS]

COMMANDS:
    generate [OPTIONS] <message...>   Generate a reply through the configured providers
    check-config [--config <path>]    Validate configuration and show provider order
    version                           Show version information
    help                              Show this help message

GENERATE OPTIONS:
    --config <path>       Configuration file (default: relay.yaml, or AI_RELAY_CONFIG)
    --context <tag>       Context tag used for routing and fallback text (default: general)
    --identity <id>       Requesting identity, logged only (default: cli)
    --info <key=value>    User info passed to the prompt template (repeatable)
    --json                Print the result and logs as JSON

ENVIRONMENT:
    RUST_LOG              Log filter (default: info)
    AI_RELAY_CONFIG       Configuration file path
    AI_RELAY_*            Overrides, see the config module docs"#
    );
}

#[derive(Debug, Default)]
struct GenerateArgs {
    config: Option<String>,
    context: Option<String>,
    identity: Option<String>,
    info: UserInfo,
    json: bool,
    message: Vec<String>,
}

fn parse_generate_args(args: &[String]) -> anyhow::Result<GenerateArgs> {
    let mut out = GenerateArgs::default();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => out.config = Some(next_value(&mut it, "--config")?),
            "--context" => out.context = Some(next_value(&mut it, "--context")?),
            "--identity" => out.identity = Some(next_value(&mut it, "--identity")?),
            "--info" => {
                let raw = next_value(&mut it, "--info")?;
                let Some((k, v)) = raw.split_once('=') else {
                    bail!("--info expects key=value, got '{raw}'");
                };
                out.info.insert(k.trim().to_string(), v.trim().to_string());
            }
            "--json" => out.json = true,
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            word => out.message.push(word.to_string()),
        }
    }
    Ok(out)
}

fn next_value<'a>(it: &mut impl Iterator<Item = &'a String>, flag: &str) -> anyhow::Result<String> {
    match it.next() {
        Some(v) => Ok(v.clone()),
        None => bail!("{flag} requires a value"),
    }
}

fn config_path(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var("AI_RELAY_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
}

fn load_config(path: &str) -> anyhow::Result<RelayConfig> {
    let mut config =
        RelayConfig::load(path).with_context(|| format!("loading configuration from {path}"))?;
    config
        .apply_env_overrides()
        .context("applying environment overrides")?;
    Ok(config)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn cmd_generate(args: &[String]) -> anyhow::Result<()> {
    let args = parse_generate_args(args)?;
    if args.message.is_empty() {
        bail!("generate requires a message");
    }
    init_tracing(args.json);

    let config = load_config(&config_path(args.config))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    let message = args.message.join(" ");
    let context = args.context.unwrap_or_else(|| "general".to_string());
    let identity = args.identity.unwrap_or_else(|| "cli".to_string());

    let result = runtime.block_on(async {
        let relay = config.build_orchestrator()?;
        let result = relay.respond(&identity, &message, &context, &args.info).await;
        relay.shutdown();
        Ok::<_, ai_relay::Error>(result)
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.content);
        eprintln!(
            "-- provider: {}, attempts: {}, latency: {}ms",
            result.provider_used, result.attempts, result.latency_ms
        );
    }
    if result.is_fallback() {
        bail!("all providers failed");
    }
    Ok(())
}

fn cmd_check_config(args: &[String]) -> anyhow::Result<()> {
    let mut explicit = None;
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => explicit = Some(next_value(&mut it, "--config")?),
            other => bail!("unknown option {other}"),
        }
    }
    let path = config_path(explicit);
    let config = load_config(&path)?;
    config.validate()?;
    print!("{}", config_report(&path, &config, |k| std::env::var(k).ok()));
    Ok(())
}

fn config_report<F>(path: &str, config: &RelayConfig, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(out, "Configuration: {path}");
    let _ = writeln!(
        out,
        "deadline: {}ms, cache: {} (ttl {}s, max {} entries)",
        config.deadline_ms,
        if config.cache.enabled { "on" } else { "off" },
        config.cache.ttl_secs,
        config.cache.max_entries
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Providers (in default order):");
    let mut providers: Vec<_> = config.providers.iter().collect();
    providers.sort_by_key(|p| p.priority);
    for p in providers {
        let key = p.resolve_api_key(&lookup);
        let rpm = if p.requests_per_minute == 0 {
            "unlimited".to_string()
        } else {
            format!("{}/min", p.requests_per_minute)
        };
        let _ = writeln!(
            out,
            "  {:<16} {:<7} {:<24} timeout {}ms, {}, key {}",
            p.name,
            p.kind.id(),
            p.model(),
            p.timeout_ms,
            rpm,
            if key.is_some() { "found" } else { "MISSING" }
        );
    }
    if !config.routes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Routes:");
        for (context, targets) in &config.routes {
            let _ = writeln!(out, "  {:<16} {}", context, targets.join(" -> "));
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "configuration valid");
    out
}
