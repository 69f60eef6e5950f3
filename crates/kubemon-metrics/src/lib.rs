/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-metrics/src/lib.rs
 *
 * Prometheus metrics for the monitoring service, following the same
 * `lazy_static!` registration shape as `ph_operator/src/metrics.rs`: metrics
 * are created once, globally, and registered into a fresh `Registry` at
 * startup so the `/metrics` facade route can render them on demand.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use lazy_static::lazy_static;
use prometheus::{
    opts, register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

lazy_static! {
    /// Total checks executed, labeled by check name and resulting status.
    pub static ref CHECKS_EXECUTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "kubemon_checks_executed_total",
        "Total number of health check executions.",
        &["check", "status"]
    )
    .unwrap();

    /// Wall-clock duration of a single check execution, in seconds.
    pub static ref CHECK_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "kubemon_check_duration_seconds",
        "Duration of a single health check execution.",
        &["check"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    /// Current number of registered checks.
    pub static ref CHECKS_REGISTERED: IntGauge =
        register_int_gauge!(opts!("kubemon_checks_registered", "Current number of registered health checks.")).unwrap();

    /// Total alerts fired, labeled by rule name and severity.
    pub static ref ALERTS_FIRED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "kubemon_alerts_fired_total",
        "Total number of alerts fired.",
        &["rule", "severity"]
    )
    .unwrap();

    /// Total AI subprocess invocations, labeled by mode and outcome.
    pub static ref AI_INVOCATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "kubemon_ai_invocations_total",
        "Total number of AI wrapper invocations.",
        &["mode", "outcome"]
    )
    .unwrap();

    /// Latency of an AI subprocess invocation, in seconds.
    pub static ref AI_INVOCATION_DURATION_SECONDS: Histogram = register_histogram!(
        "kubemon_ai_invocation_duration_seconds",
        "Duration of AI wrapper subprocess invocations.",
        vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]
    )
    .unwrap();

    /// Current number of connected broadcast subscribers.
    pub static ref BROADCAST_SUBSCRIBERS: IntGauge = register_int_gauge!(opts!(
        "kubemon_broadcast_subscribers",
        "Current number of connected WebSocket subscribers."
    ))
    .unwrap();

    /// Total check-result store evictions performed by the TTL janitor.
    pub static ref RESULT_STORE_EVICTIONS_TOTAL: IntCounter = register_int_counter!(opts!(
        "kubemon_result_store_evictions_total",
        "Total number of check results evicted by the TTL janitor."
    ))
    .unwrap();
}

/// Registers every metric above into a fresh `Registry`. Intended to be
/// called exactly once at process startup.
pub fn create_and_register_metrics() -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();
    registry.register(Box::new(CHECKS_EXECUTED_TOTAL.clone()))?;
    registry.register(Box::new(CHECK_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(CHECKS_REGISTERED.clone()))?;
    registry.register(Box::new(ALERTS_FIRED_TOTAL.clone()))?;
    registry.register(Box::new(AI_INVOCATIONS_TOTAL.clone()))?;
    registry.register(Box::new(AI_INVOCATION_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(BROADCAST_SUBSCRIBERS.clone()))?;
    registry.register(Box::new(RESULT_STORE_EVICTIONS_TOTAL.clone()))?;
    Ok(registry)
}

/// Renders `registry` into the Prometheus text exposition format, used by
/// the facade's `GetMetrics` route.
pub fn encode(registry: &Registry) -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}
