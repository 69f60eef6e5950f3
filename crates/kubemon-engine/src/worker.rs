/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-engine/src/worker.rs
 *
 * Per-check worker loop (spec §4.3). Each registered check gets its own
 * ticker; a missed tick is dropped rather than queued
 * (`MissedTickBehavior::Skip`), mirroring the "coalescing, not queueing"
 * requirement. A check's `run` is executed inside its own `tokio::spawn`
 * so a panic surfaces as a `JoinError` instead of taking the worker down —
 * the async-friendly equivalent of the teacher's `panic::catch_unwind`
 * guard around FFI entry points.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::store::ResultStore;
use kubemon_alerts::AlertManager;
use kubemon_checks::HealthCheck;
use kubemon_context::ClusterContextManager;
use chrono::Utc;
use kubemon_types::{CheckResult, ErrorKind, HealthStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct WorkerHandles {
    pub check: Arc<dyn HealthCheck>,
    pub context: Arc<ClusterContextManager>,
    pub store: Arc<ResultStore>,
    pub alerts: Arc<AlertManager>,
    pub ai: Option<Arc<kubemon_ai::AiInvoker>>,
    pub global_timeout: Duration,
}

/// Drives one check's periodic execution until `cancel` fires.
pub async fn run(handles: WorkerHandles, cancel: CancellationToken) {
    let mut ticker = interval(handles.check.interval().max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => tick(&handles).await,
            _ = cancel.cancelled() => break,
        }
    }
}

async fn tick(handles: &WorkerHandles) {
    let name = handles.check.name().to_string();

    let context = match handles.context.get_current_context().await {
        Ok(context) => context,
        Err(e) => {
            handles.store.insert(unknown_result(&name, format!("no active context: {e}"))).await;
            return;
        }
    };

    let client = match handles.context.get_client(&context.name).await {
        Ok(client) => client,
        Err(e) => {
            handles.store.insert(unknown_result(&name, format!("failed to obtain API client: {e}"))).await;
            return;
        }
    };

    let previous_status = handles.store.get(&name).await.map(|r| r.status);
    let result = execute_with_deadline(handles.check.clone(), client, handles.global_timeout).await;

    kubemon_metrics::CHECKS_EXECUTED_TOTAL.with_label_values(&[&name, &format!("{:?}", result.status)]).inc();
    kubemon_metrics::CHECK_DURATION_SECONDS
        .with_label_values(&[&name])
        .observe(result.duration_ms as f64 / 1000.0);

    handles.store.insert(result.clone()).await;

    if let Err(e) = handles.alerts.process_check_result(&result).await {
        warn!(check = %name, error = %e, "alert dispatch failed");
    }

    let transitioned_to_unhealthy =
        result.status != HealthStatus::Healthy && previous_status != Some(result.status);
    if transitioned_to_unhealthy {
        if let Some(ai) = handles.ai.clone() {
            let store = handles.store.clone();
            let result = result.clone();
            tokio::spawn(async move {
                match ai.analyze_diagnostic(&result).await {
                    Ok(response) => {
                        store
                            .enrich_details(&result.name, "aiDiagnosis", serde_json::json!(response))
                            .await;
                    }
                    Err(e) => debug!(check = %result.name, error = %e, "AI enrichment skipped"),
                }
            });
        }
    }
}

pub(crate) async fn execute_with_deadline(
    check: Arc<dyn HealthCheck>,
    client: kube::Client,
    global_timeout: Duration,
) -> CheckResult {
    let name = check.name().to_string();
    let started = Instant::now();
    let deadline = started + global_timeout;

    let handle = tokio::spawn(async move { check.run(client, deadline).await });
    let outcome = timeout(global_timeout, handle).await;

    classify_outcome(&name, outcome, started.elapsed().as_millis() as u64)
}

type RunOutcome = Result<
    Result<Result<CheckResult, kubemon_checks::CheckError>, tokio::task::JoinError>,
    tokio::time::error::Elapsed,
>;

/// Turns the nested timeout/panic/check-error outcome of a single check
/// execution into the `CheckResult` that gets written to the store. Kept
/// free of any `kube::Client`/spawn concerns so it can be exercised directly
/// against hand-built outcome values.
pub(crate) fn classify_outcome(name: &str, outcome: RunOutcome, duration_ms: u64) -> CheckResult {
    match outcome {
        Ok(Ok(Ok(result))) if result.is_well_formed() => result,
        Ok(Ok(Ok(malformed))) => {
            warn!(check = %name, "check produced an ill-formed result, recording as unknown");
            unknown_result(&malformed.name, "check violated the well-formedness invariant".to_string())
        }
        Ok(Ok(Err(check_error))) => {
            let mut result = unknown_result(name, check_error.to_string());
            result.duration_ms = duration_ms;
            result
        }
        Ok(Err(join_error)) => {
            let mut result = unknown_result(name, format!("check panicked: {join_error}"));
            result.duration_ms = duration_ms;
            result
        }
        Err(_) => {
            let mut result = unknown_result(name, "check exceeded its deadline".to_string());
            result.duration_ms = duration_ms;
            result
        }
    }
}

fn unknown_result(name: &str, message: String) -> CheckResult {
    CheckResult {
        name: name.to_string(),
        status: HealthStatus::Unknown,
        message: message.clone(),
        timestamp: Utc::now(),
        duration_ms: 0,
        details: BTreeMap::new(),
        metrics: vec![],
        error: Some(ErrorKind::Transient(message)),
        confidence: 1.0,
        predictions: vec![],
        labels: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubemon_checks::CheckError;

    fn healthy(name: &str) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            status: HealthStatus::Healthy,
            message: "ok".to_string(),
            timestamp: Utc::now(),
            duration_ms: 5,
            details: BTreeMap::new(),
            metrics: vec![],
            error: None,
            confidence: 1.0,
            predictions: vec![],
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn well_formed_result_passes_through_unchanged() {
        let outcome: RunOutcome = Ok(Ok(Ok(healthy("pods"))));
        let result = classify_outcome("pods", outcome, 5);
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.name, "pods");
    }

    #[test]
    fn check_error_is_recorded_as_unknown() {
        let outcome: RunOutcome = Ok(Ok(Err(CheckError::Transient("api unreachable".to_string()))));
        let result = classify_outcome("pods", outcome, 12);
        assert_eq!(result.status, HealthStatus::Unknown);
        assert!(result.message.contains("api unreachable"));
        assert_eq!(result.duration_ms, 12);
    }

    #[test]
    fn ill_formed_result_is_replaced_with_unknown() {
        let mut malformed = healthy("pods");
        malformed.status = HealthStatus::Unknown;
        malformed.error = None;
        let outcome: RunOutcome = Ok(Ok(Ok(malformed)));
        let result = classify_outcome("pods", outcome, 0);
        assert_eq!(result.status, HealthStatus::Unknown);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn panicking_check_is_recorded_as_unknown() {
        let handle: tokio::task::JoinHandle<Result<CheckResult, CheckError>> =
            tokio::spawn(async { panic!("boom") });
        let outcome: RunOutcome = timeout(Duration::from_secs(1), handle).await;
        let result = classify_outcome("pods", outcome, 3);
        assert_eq!(result.status, HealthStatus::Unknown);
        assert!(result.message.contains("panicked"));
    }

    #[tokio::test]
    async fn deadline_exceeded_is_recorded_as_unknown() {
        let handle: tokio::task::JoinHandle<Result<CheckResult, CheckError>> = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            unreachable!("sleep outlasts the timeout below")
        });
        let outcome: RunOutcome = timeout(Duration::from_millis(5), handle).await;
        let result = classify_outcome("pods", outcome, 5);
        assert_eq!(result.status, HealthStatus::Unknown);
        assert!(result.message.contains("deadline"));
    }
}
