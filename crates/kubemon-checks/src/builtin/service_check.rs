/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-checks/src/builtin/service_check.rs
 *
 * Checks that a Service has at least one ready endpoint address. Reports
 * `Unhealthy` when the service has zero ready addresses (nothing can serve
 * traffic) and `Degraded` when some addresses are not-ready.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::{CheckError, HealthCheck};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Endpoints;
use kube::api::Api;
use kube::Client;
use kubemon_types::{CheckResult, Criticality, ErrorKind, HealthStatus};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

pub struct ServiceEndpointsCheck {
    name: String,
    namespace: String,
    service_name: String,
    interval: Duration,
    criticality: Criticality,
}

impl ServiceEndpointsCheck {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            service_name: service_name.into(),
            interval: Duration::from_secs(30),
            criticality: Criticality::Medium,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl HealthCheck for ServiceEndpointsCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Reports unhealthy when a Service has no ready endpoint addresses."
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn criticality(&self) -> Criticality {
        self.criticality
    }

    async fn run(&self, client: Client, _deadline: Instant) -> Result<CheckResult, CheckError> {
        let started = Instant::now();
        let endpoints: Api<Endpoints> = Api::namespaced(client, &self.namespace);
        let ep = match endpoints.get(&self.service_name).await {
            Ok(ep) => ep,
            Err(kube::Error::Api(e)) if e.code == 404 => {
                return Ok(CheckResult {
                    name: self.name.clone(),
                    status: HealthStatus::Unhealthy,
                    message: format!("service '{}' not found", self.service_name),
                    timestamp: chrono::Utc::now(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    details: BTreeMap::new(),
                    metrics: vec![],
                    error: Some(ErrorKind::Permanent("service not found".into())),
                    confidence: 1.0,
                    predictions: vec![],
                    labels: BTreeMap::new(),
                })
            }
            Err(e) => return Err(CheckError::Transient(format!("failed to fetch endpoints: {e}"))),
        };

        let (ready, not_ready) = ep.subsets.unwrap_or_default().into_iter().fold((0usize, 0usize), |(r, nr), subset| {
            let ready_here = subset.addresses.map(|a| a.len()).unwrap_or(0);
            let not_ready_here = subset.not_ready_addresses.map(|a| a.len()).unwrap_or(0);
            (r + ready_here, nr + not_ready_here)
        });

        let status = if ready == 0 {
            HealthStatus::Unhealthy
        } else if not_ready > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Ok(CheckResult {
            name: self.name.clone(),
            status,
            message: format!("{ready} ready, {not_ready} not ready"),
            timestamp: chrono::Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
            details: BTreeMap::new(),
            metrics: vec![],
            error: None,
            confidence: 1.0,
            predictions: vec![],
            labels: BTreeMap::new(),
        })
    }
}
