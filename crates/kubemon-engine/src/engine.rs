/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-engine/src/engine.rs
 *
 * The monitoring engine (C4, spec §4.3): owns the result store, spawns one
 * worker per registered check, runs the TTL janitor, and derives
 * `ClusterHealth` snapshots on demand. Concurrent task ownership mirrors
 * `ph_operator/src/main.rs`'s `tokio::join!` orchestration, generalized
 * from a fixed controller set to a dynamically-sized worker pool tracked
 * in a `JoinSet`.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::score::{aggregate, overall_status};
use crate::store::ResultStore;
use crate::worker::{self, WorkerHandles};
use chrono::Duration as ChronoDuration;
use kubemon_alerts::AlertManager;
use kubemon_checks::{CheckRegistry, HealthCheck, RegistryError};
use kubemon_context::ClusterContextManager;
use kubemon_types::{Alert, ClusterHealth, Criticality};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("the engine is already started")]
    AlreadyStarted,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("graceful shutdown deadline elapsed with workers still running")]
    ShutdownTimeout,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub global_check_timeout: Duration,
    pub results_ttl: ChronoDuration,
    pub janitor_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            global_check_timeout: Duration::from_secs(30),
            results_ttl: ChronoDuration::hours(24),
            janitor_interval: Duration::from_secs(3600),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

/// Periodic scheduler, result store, and snapshot generator. Construct
/// once, call `start`, and `stop` it before dropping to avoid leaking
/// workers (the engine itself does not assert this on `Drop`, matching the
/// teacher's "shutdown is the caller's job" style elsewhere).
pub struct MonitoringEngine {
    registry: Arc<CheckRegistry>,
    context: Arc<ClusterContextManager>,
    alerts: Arc<AlertManager>,
    ai: Option<Arc<kubemon_ai::AiInvoker>>,
    store: Arc<ResultStore>,
    config: EngineConfig,
    running: Mutex<Option<Running>>,
    cluster_name: String,
}

impl MonitoringEngine {
    pub fn new(
        cluster_name: impl Into<String>,
        registry: Arc<CheckRegistry>,
        context: Arc<ClusterContextManager>,
        alerts: Arc<AlertManager>,
        ai: Option<Arc<kubemon_ai::AiInvoker>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            context,
            alerts,
            ai,
            store: Arc::new(ResultStore::new()),
            config,
            running: Mutex::new(None),
            cluster_name: cluster_name.into(),
        }
    }

    pub async fn add_check(&self, check: Arc<dyn HealthCheck>) -> Result<(), EngineError> {
        self.registry.register(check).await?;
        Ok(())
    }

    /// Snapshots the current registry and spawns one worker per check plus
    /// the TTL janitor. Fails with `AlreadyStarted` if called twice without
    /// an intervening `stop`.
    pub async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(EngineError::AlreadyStarted);
        }

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        for check in self.registry.list().await {
            let handles = WorkerHandles {
                check,
                context: self.context.clone(),
                store: self.store.clone(),
                alerts: self.alerts.clone(),
                ai: self.ai.clone(),
                global_timeout: self.config.global_check_timeout,
            };
            let worker_cancel = cancel.clone();
            tasks.spawn(worker::run(handles, worker_cancel));
        }

        let janitor_store = self.store.clone();
        let janitor_ttl = self.config.results_ttl;
        let janitor_interval = self.config.janitor_interval;
        let janitor_cancel = cancel.clone();
        tasks.spawn(async move {
            let mut ticker = tokio::time::interval(janitor_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = janitor_store.evict_older_than(chrono::Utc::now(), janitor_ttl).await;
                        if evicted > 0 {
                            kubemon_metrics::RESULT_STORE_EVICTIONS_TOTAL.inc_by(evicted as u64);
                            info!(evicted, "TTL janitor evicted stale results");
                        }
                    }
                    _ = janitor_cancel.cancelled() => break,
                }
            }
        });

        *running = Some(Running { cancel, tasks });
        Ok(())
    }

    /// Cancels every worker and the janitor, then waits up to `deadline`
    /// for them to finish. Leaves the engine stopped either way; returns
    /// `ShutdownTimeout` if workers were still running when the deadline
    /// elapsed.
    pub async fn stop(&self, deadline: Duration) -> Result<(), EngineError> {
        let Some(Running { cancel, mut tasks }) = self.running.lock().await.take() else {
            return Ok(());
        };
        cancel.cancel();

        let join_all = async {
            while tasks.join_next().await.is_some() {}
        };
        match tokio::time::timeout(deadline, join_all).await {
            Ok(()) => Ok(()),
            Err(_) => Err(EngineError::ShutdownTimeout),
        }
    }

    pub async fn get_result(&self, name: &str) -> Option<kubemon_types::CheckResult> {
        self.store.get(name).await
    }

    pub async fn get_results(&self) -> Vec<kubemon_types::CheckResult> {
        self.store.get_all().await
    }

    /// Derives a fresh `ClusterHealth` snapshot from the current result
    /// store and the alert manager's active alert set. Never cached.
    pub async fn get_cluster_health(&self) -> ClusterHealth {
        let checks = self.store.get_all().await;

        let mut weighted_inputs = Vec::with_capacity(checks.len());
        for check in &checks {
            let criticality = match self.registry.get(&check.name).await {
                Some(c) => c.criticality(),
                None => Criticality::Low,
            };
            weighted_inputs.push((criticality, check.status, check.confidence));
        }

        let score = aggregate(&weighted_inputs);
        let overall = overall_status(checks.iter().map(|c| &c.status));
        let active_alerts: Vec<Alert> = self.alerts.get_active_alerts().await;
        let generated_by = match self.context.get_current_context().await {
            Ok(profile) => profile.name,
            Err(_) => self.cluster_name.clone(),
        };

        ClusterHealth {
            cluster_name: self.cluster_name.clone(),
            timestamp: chrono::Utc::now(),
            overall,
            score,
            checks,
            active_alerts,
            generated_by,
        }
    }
}
