/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-types/src/lib.rs
 *
 * Shared data model for the kubemon cluster-health monitor: health
 * statuses, criticality weights, check results, metrics, cluster health
 * snapshots, alerts, alert rules, silences, context profiles, subscribers
 * and circuit-breaker state. Every type here is plain data; the behavior
 * that operates on it lives in the collaborating crates.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overall health of a single check, or of a cluster snapshot.
///
/// Ordered `healthy < degraded < unhealthy < unknown` so callers can take the
/// worst status across a set of checks with a plain `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    /// Score contribution used by weighted aggregation (§4.3 of the spec).
    pub fn score(self) -> f64 {
        match self {
            HealthStatus::Healthy => 1.0,
            HealthStatus::Degraded => 0.5,
            HealthStatus::Unhealthy => 0.0,
            HealthStatus::Unknown => 0.0,
        }
    }
}

/// Criticality of a check, used to weight its contribution to the cluster
/// score. Weight mapping per the spec: low=1, medium=2, high=4, critical=8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Low,
    Medium,
    High,
    Critical,
}

impl Criticality {
    pub fn weight(self) -> u32 {
        match self {
            Criticality::Low => 1,
            Criticality::Medium => 2,
            Criticality::High => 4,
            Criticality::Critical => 8,
        }
    }
}

/// Kind of error recorded against a `CheckResult` when `status` degrades.
/// Matches the taxonomy in spec §7.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ErrorKind {
    Transient(String),
    Permanent(String),
    Timeout(String),
}

/// A single measurement produced by a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub unit: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Gauge,
    Counter,
    Histogram,
}

/// A diagnostic or remediation suggestion produced by the AI wrapper (§4.6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthPrediction {
    pub summary: String,
    pub confidence: f64,
    pub horizon: String,
}

/// Outcome of running a single health check once.
///
/// Invariant (spec §3): `name` is non-empty and matches a registered check;
/// if `status == Unknown` then `error` must be `Some`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub error: Option<ErrorKind>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub predictions: Vec<HealthPrediction>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_confidence() -> f64 {
    1.0
}

impl CheckResult {
    /// Panics in debug builds if the `Unknown`-implies-`error` invariant is
    /// violated; used by tests and by the engine right before a result is
    /// written to the store.
    pub fn is_well_formed(&self) -> bool {
        !self.name.is_empty() && (self.status != HealthStatus::Unknown || self.error.is_some())
    }
}

/// A weighted/raw/confidence score triple, computed fresh for every
/// `ClusterHealth` snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub raw: f64,
    pub weighted: f64,
    pub confidence: f64,
}

/// Derived, never-persisted snapshot combining the current result set and
/// active alerts for one cluster context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub cluster_name: String,
    pub timestamp: DateTime<Utc>,
    pub overall: HealthStatus,
    pub score: Score,
    pub checks: Vec<CheckResult>,
    pub active_alerts: Vec<Alert>,
    pub generated_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Firing,
    Resolved,
    Silenced,
}

/// A fired alert. `fingerprint` coalesces alerts describing "the same
/// issue" (same rule + same affected resource key, see spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub fingerprint: String,
    pub name: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub status: AlertStatus,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// One cluster connection target. Exactly one `ContextProfile` is current at
/// any moment (spec §3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextProfile {
    pub name: String,
    pub cluster_endpoint: String,
    pub default_namespace: String,
    pub is_current: bool,
}

/// State of a long-lived broadcast subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberState {
    Alive,
    Closing,
    Closed,
}

/// Circuit-breaker state, exposed read-only for diagnostics; the breaker
/// itself lives in `kubemon-ai`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_orders_worst_last() {
        let mut statuses = vec![
            HealthStatus::Unknown,
            HealthStatus::Healthy,
            HealthStatus::Unhealthy,
            HealthStatus::Degraded,
        ];
        statuses.sort();
        assert_eq!(
            statuses,
            vec![
                HealthStatus::Healthy,
                HealthStatus::Degraded,
                HealthStatus::Unhealthy,
                HealthStatus::Unknown,
            ]
        );
    }

    #[test]
    fn criticality_weights_match_spec() {
        assert_eq!(Criticality::Low.weight(), 1);
        assert_eq!(Criticality::Medium.weight(), 2);
        assert_eq!(Criticality::High.weight(), 4);
        assert_eq!(Criticality::Critical.weight(), 8);
    }

    #[test]
    fn unknown_without_error_is_not_well_formed() {
        let result = CheckResult {
            name: "pods".into(),
            status: HealthStatus::Unknown,
            message: String::new(),
            timestamp: Utc::now(),
            duration_ms: 0,
            details: BTreeMap::new(),
            metrics: vec![],
            error: None,
            confidence: 1.0,
            predictions: vec![],
            labels: BTreeMap::new(),
        };
        assert!(!result.is_well_formed());
    }
}
