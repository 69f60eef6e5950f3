/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-checks/src/builtin/node_check.rs
 *
 * Checks that every cluster Node reports a `Ready` condition of `True` and
 * is not cordoned. Shallow by design (§4.1 treats built-in checks as
 * external collaborators); exists so the engine has a cluster-wide check to
 * register out of the box.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::{CheckError, HealthCheck};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::Client;
use kubemon_types::{CheckResult, Criticality, HealthStatus};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

pub struct NodeConditionCheck {
    name: String,
    interval: Duration,
    criticality: Criticality,
}

impl NodeConditionCheck {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: Duration::from_secs(60),
            criticality: Criticality::Critical,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl HealthCheck for NodeConditionCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Reports degraded/unhealthy when nodes are not Ready or are cordoned."
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn criticality(&self) -> Criticality {
        self.criticality
    }

    async fn run(&self, client: Client, _deadline: Instant) -> Result<CheckResult, CheckError> {
        let started = Instant::now();
        let nodes: Api<Node> = Api::all(client);
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| CheckError::Transient(format!("failed to list nodes: {e}")))?;

        let mut not_ready = Vec::new();
        let mut cordoned = Vec::new();
        for node in &list.items {
            let node_name = node.metadata.name.clone().unwrap_or_default();
            let is_ready = node
                .status
                .as_ref()
                .and_then(|s| s.conditions.as_ref())
                .is_some_and(|conds| {
                    conds
                        .iter()
                        .any(|c| c.type_ == "Ready" && c.status == "True")
                });
            if !is_ready {
                not_ready.push(node_name.clone());
            }
            if node.spec.as_ref().and_then(|s| s.unschedulable).unwrap_or(false) {
                cordoned.push(node_name);
            }
        }

        let status = if !not_ready.is_empty() {
            HealthStatus::Unhealthy
        } else if !cordoned.is_empty() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let mut details = BTreeMap::new();
        details.insert("not_ready".to_string(), serde_json::to_value(&not_ready).unwrap_or_default());
        details.insert("cordoned".to_string(), serde_json::to_value(&cordoned).unwrap_or_default());

        Ok(CheckResult {
            name: self.name.clone(),
            status,
            message: format!("{}/{} nodes ready", list.items.len() - not_ready.len(), list.items.len()),
            timestamp: chrono::Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
            details,
            metrics: vec![],
            error: None,
            confidence: 1.0,
            predictions: vec![],
            labels: BTreeMap::new(),
        })
    }
}
