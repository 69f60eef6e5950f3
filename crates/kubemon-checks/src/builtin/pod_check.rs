/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-checks/src/builtin/pod_check.rs
 *
 * Checks that every Pod matching a label selector in a namespace is
 * `Running` with all containers ready. Generalizes the pod-phase and
 * container-readiness inspection from `k8s_health/src/health_logic.rs`'s
 * `check_pod_health` into a standalone `HealthCheck`.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::{CheckError, HealthCheck};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use kubemon_types::{CheckResult, Criticality, ErrorKind, HealthStatus};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

pub struct PodReadinessCheck {
    name: String,
    namespace: String,
    label_selector: String,
    interval: Duration,
    criticality: Criticality,
}

impl PodReadinessCheck {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, label_selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            label_selector: label_selector.into(),
            interval: Duration::from_secs(30),
            criticality: Criticality::High,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = criticality;
        self
    }
}

#[async_trait]
impl HealthCheck for PodReadinessCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Reports unhealthy when any matching pod is not Running with all containers ready."
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn criticality(&self) -> Criticality {
        self.criticality
    }

    async fn run(&self, client: Client, _deadline: Instant) -> Result<CheckResult, CheckError> {
        let started = Instant::now();
        let pods: Api<Pod> = Api::namespaced(client, &self.namespace);
        let lp = ListParams::default().labels(&self.label_selector);
        let list = pods
            .list(&lp)
            .await
            .map_err(|e| CheckError::Transient(format!("failed to list pods: {e}")))?;

        if list.items.is_empty() {
            return Ok(result(
                &self.name,
                HealthStatus::Unhealthy,
                "no pods matched selector".into(),
                Some(ErrorKind::Permanent("empty pod selection".into())),
                started,
            ));
        }

        let mut not_ready = Vec::new();
        for pod in &list.items {
            let pod_name = pod.metadata.name.clone().unwrap_or_default();
            let Some(status) = pod.status.as_ref() else {
                not_ready.push(pod_name);
                continue;
            };
            let running = status.phase.as_deref() == Some("Running");
            let all_ready = status
                .container_statuses
                .as_ref()
                .is_some_and(|statuses| statuses.iter().all(|s| s.ready));
            if !running || !all_ready {
                not_ready.push(pod_name);
            }
        }

        if not_ready.is_empty() {
            Ok(result(
                &self.name,
                HealthStatus::Healthy,
                format!("{} pod(s) ready", list.items.len()),
                None,
                started,
            ))
        } else {
            let mut details = BTreeMap::new();
            details.insert(
                "not_ready_pods".to_string(),
                serde_json::to_value(&not_ready).unwrap_or_default(),
            );
            Ok(CheckResult {
                details,
                ..result(
                    &self.name,
                    HealthStatus::Unhealthy,
                    format!("{} pod(s) not ready", not_ready.len()),
                    None,
                    started,
                )
            })
        }
    }
}

fn result(
    name: &str,
    status: HealthStatus,
    message: String,
    error: Option<ErrorKind>,
    started: Instant,
) -> CheckResult {
    CheckResult {
        name: name.to_string(),
        status,
        message,
        timestamp: chrono::Utc::now(),
        duration_ms: started.elapsed().as_millis() as u64,
        details: BTreeMap::new(),
        metrics: vec![],
        error,
        confidence: 1.0,
        predictions: vec![],
        labels: BTreeMap::new(),
    }
}
