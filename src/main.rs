/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/main.rs
 *
 * Entry point for the `kubemon` binary: wires every crate in the workspace
 * into one running service. Orchestration follows `ph_operator/src/main.rs`'s
 * shape — initialize telemetry, build a shared context, then run every
 * long-lived task concurrently via `tokio::join!` — generalized from a fixed
 * controller set to this service's engine/broadcast/HTTP trio.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use anyhow::{Context, Result};
use kubemon_ai::{AiConfig, AiInvoker, SessionLog};
use kubemon_alerts::{AlertManager, AlertRule, LogChannel, WebhookChannel};
use kubemon_checks::builtin::{NodeConditionCheck, PodReadinessCheck, ServiceEndpointsCheck};
use kubemon_checks::CheckRegistry;
use kubemon_config::{AlertsConfig, Config};
use kubemon_context::ClusterContextManager;
use kubemon_engine::{EngineConfig, MonitoringEngine};
use kubemon_facade::AppState;
use kubemon_types::{AlertSeverity, CheckResult, HealthStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json();
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// The only CLI surface this binary accepts (spec §6): `--config <path>`
/// overrides which configuration file is read. A full argument parser is
/// explicitly out of scope.
fn parse_cli_config_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

#[tokio::main]
async fn main() {
    init_logging();

    let config = match kubemon_config::load(parse_cli_config_path().as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!(error = ?e, "kubemon exited with an irrecoverable startup error");
        std::process::exit(2);
    }
}

async fn run(config: Config) -> Result<()> {
    let preferred_context =
        if config.kubernetes.context.is_empty() { None } else { Some(config.kubernetes.context.as_str()) };
    let context = Arc::new(
        ClusterContextManager::load(PathBuf::from(&config.kubernetes.kubeconfig), preferred_context)
            .await
            .context("failed to load cluster-context profile file")?,
    );
    let cluster_name = context
        .get_current_context()
        .await
        .map(|c| c.name)
        .unwrap_or_else(|_| "unknown".to_string());

    let registry = Arc::new(CheckRegistry::new());
    register_builtin_checks(&registry, &config).await.context("failed to register built-in checks")?;
    kubemon_metrics::CHECKS_REGISTERED.set(registry.count().await as i64);

    let alerts = Arc::new(AlertManager::new(config.monitoring.max_history));
    register_channels(&alerts, &config.alerts);
    register_rules(&alerts, &config.alerts).await.context("failed to register alert rules")?;

    let ai = build_ai_invoker(&config).await.context("failed to initialize AI wrapper")?;

    let engine = Arc::new(MonitoringEngine::new(
        cluster_name,
        registry,
        context.clone(),
        alerts.clone(),
        ai.clone(),
        EngineConfig {
            global_check_timeout: Duration::from_millis(config.monitoring.timeout_ms),
            ..EngineConfig::default()
        },
    ));

    let broadcast = kubemon_broadcast::BroadcastHub::new(kubemon_broadcast::BroadcastConfig::default());
    let metrics_registry =
        Arc::new(kubemon_metrics::create_and_register_metrics().context("failed to register Prometheus metrics")?);

    let state = Arc::new(AppState {
        engine: engine.clone(),
        context,
        alerts,
        ai,
        broadcast: broadcast.clone(),
        metrics_registry,
        max_subscribers: 1024,
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
    });

    engine.start().await.context("failed to start monitoring engine")?;

    let shutdown = tokio_util::sync::CancellationToken::new();
    let snapshot_bridge = spawn_snapshot_bridge(engine.clone(), broadcast.clone(), shutdown.clone());
    let broadcast_loop = tokio::spawn(broadcast.clone().run(shutdown.clone()));

    let addr: std::net::SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host/server.port configuration")?;
    let routes = kubemon_facade::routes(state);

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let (_, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async move {
        rx.await.ok();
    });

    info!(%addr, "kubemon facade listening");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = server => {
            warn!("HTTP server exited on its own");
        }
    }

    let _ = tx.send(());
    shutdown.cancel();
    let _ = snapshot_bridge.await;
    let _ = broadcast_loop.await;
    engine.stop(Duration::from_secs(30)).await.context("monitoring engine failed to stop cleanly")?;

    Ok(())
}

/// Bridges engine snapshots into the broadcast hub on the hub's own cadence.
/// The engine has no knowledge of the hub (spec §4.3/§4.5 describe them as
/// independent collaborators); this loop is the wiring between them.
fn spawn_snapshot_bridge(
    engine: Arc<MonitoringEngine>,
    broadcast: Arc<kubemon_broadcast::BroadcastHub>,
    cancel: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let health = engine.get_cluster_health().await;
                    kubemon_metrics::BROADCAST_SUBSCRIBERS.set(broadcast.subscriber_count().await as i64);
                    broadcast.set_snapshot(health).await;
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}

async fn register_builtin_checks(registry: &CheckRegistry, config: &kubemon_config::Config) -> Result<()> {
    let enabled = &config.monitoring.enabled_checks;
    let want = |name: &str| enabled.is_empty() || enabled.iter().any(|n| n == name);

    if want("nodes") {
        registry.register(Arc::new(NodeConditionCheck::new("nodes"))).await?;
    }
    if want("pods") {
        registry
            .register(Arc::new(PodReadinessCheck::new("pods", "default", "")))
            .await?;
    }
    if want("services") {
        // Every cluster exposes the `kubernetes` service in `default`; absent
        // per-check target configuration, it is the one endpoint guaranteed
        // to exist to monitor by default.
        registry
            .register(Arc::new(ServiceEndpointsCheck::new("services", "default", "kubernetes")))
            .await?;
    }
    Ok(())
}

fn register_channels(alerts: &AlertManager, config: &AlertsConfig) {
    alerts.register_channel(Arc::new(LogChannel::new("log")));

    for (name, channel) in &config.channels {
        if !channel.enabled {
            continue;
        }
        match channel.channel_type.as_str() {
            "log" => alerts.register_channel(Arc::new(LogChannel::new(name.clone()))),
            "webhook" => match channel.settings.get("url").and_then(|v| v.as_str()) {
                Some(url) => alerts.register_channel(Arc::new(WebhookChannel::new(name.clone(), url))),
                None => warn!(channel = %name, "webhook channel is missing a 'url' setting, skipping"),
            },
            other => warn!(channel = %name, kind = other, "unknown channel type, skipping"),
        }
    }
}

async fn register_rules(alerts: &AlertManager, config: &AlertsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }
    for (name, rule) in &config.rules {
        let predicate = parse_predicate(&rule.predicate)
            .with_context(|| format!("alert rule '{name}' has an unparseable predicate '{}'", rule.predicate))?;
        let severity = parse_severity(&rule.severity)
            .with_context(|| format!("alert rule '{name}' has an unknown severity '{}'", rule.severity))?;
        let template = if rule.template.is_empty() { "{check} is {status}: {message}".to_string() } else { rule.template.clone() };

        alerts
            .add_rule(AlertRule::new(
                name.clone(),
                predicate,
                severity,
                chrono::Duration::milliseconds(rule.cooldown_ms as i64),
                rule.channel.clone(),
                template,
            ))
            .await;
    }
    Ok(())
}

/// Interprets a rule predicate string of the form `status == <value>` or
/// `status != <value>`, the only expression shape the config schema
/// declares support for (a full predicate language is out of scope).
fn parse_predicate(expr: &str) -> Result<impl Fn(&CheckResult) -> bool + Send + Sync + 'static> {
    let expr = expr.trim();
    let (negate, rhs) = if let Some(rhs) = expr.strip_prefix("status!=") {
        (true, rhs)
    } else if let Some(rhs) = expr.strip_prefix("status ==") {
        (false, rhs)
    } else if let Some(rhs) = expr.strip_prefix("status !=") {
        (true, rhs)
    } else if let Some(rhs) = expr.strip_prefix("status==") {
        (false, rhs)
    } else {
        anyhow::bail!("expected an expression of the form 'status == <value>'");
    };

    let target = parse_health_status(rhs.trim())?;
    Ok(move |result: &CheckResult| (result.status == target) != negate)
}

fn parse_health_status(value: &str) -> Result<HealthStatus> {
    match value.to_ascii_lowercase().as_str() {
        "healthy" => Ok(HealthStatus::Healthy),
        "degraded" => Ok(HealthStatus::Degraded),
        "unhealthy" => Ok(HealthStatus::Unhealthy),
        "unknown" => Ok(HealthStatus::Unknown),
        other => anyhow::bail!("unknown health status '{other}'"),
    }
}

fn parse_severity(value: &str) -> Result<AlertSeverity> {
    match value.to_ascii_lowercase().as_str() {
        "info" => Ok(AlertSeverity::Info),
        "warning" => Ok(AlertSeverity::Warning),
        "critical" => Ok(AlertSeverity::Critical),
        other => anyhow::bail!("unknown severity '{other}'"),
    }
}

async fn build_ai_invoker(config: &Config) -> Result<Option<Arc<AiInvoker>>> {
    if !config.ai.enabled {
        return Ok(None);
    }

    let ai_config = AiConfig {
        executable: PathBuf::from(&config.ai.executable_path),
        timeout: Duration::from_millis(config.ai.timeout_ms),
        ..AiConfig::default()
    };

    let mut invoker = AiInvoker::new(ai_config)?;
    if !config.ai.database_path.is_empty() {
        let log = SessionLog::connect(&PathBuf::from(&config.ai.database_path))
            .await
            .context("failed to open AI session log database")?;
        invoker = invoker.with_session_log(Arc::new(log));
    }
    Ok(Some(Arc::new(invoker)))
}
