/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-engine/src/lib.rs
 *
 * The monitoring engine crate (C4): per-check worker scheduling, the result
 * store, score aggregation, and the TTL janitor. See `engine.rs` for the
 * public entry point.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

mod engine;
mod score;
mod store;
mod worker;

pub use engine::{EngineConfig, EngineError, MonitoringEngine};
pub use score::{aggregate, overall_status};
pub use store::ResultStore;

#[cfg(test)]
mod tests {
    use super::*;
    use kubemon_alerts::AlertManager;
    use kubemon_checks::CheckRegistry;
    use kubemon_context::ClusterContextManager;
    use kubemon_types::HealthStatus;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    /// A context manager backed by a throwaway single-cluster profile file.
    /// None of the lifecycle tests below ever reach for a client, so the
    /// profile's `kubeconfig` path is never actually read.
    async fn new_context_manager() -> ClusterContextManager {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "clusters:\n  - name: test\n    kubeconfig: /dev/null\n").unwrap();
        ClusterContextManager::load(file.path().to_path_buf(), None).await.unwrap()
    }

    async fn new_engine() -> Arc<MonitoringEngine> {
        Arc::new(MonitoringEngine::new(
            "test-cluster",
            Arc::new(CheckRegistry::new()),
            Arc::new(new_context_manager().await),
            Arc::new(AlertManager::new(100)),
            None,
            EngineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn starting_twice_without_stopping_is_rejected() {
        let engine = new_engine().await;
        engine.start().await.unwrap();
        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyStarted));
        engine.stop(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn stopping_a_never_started_engine_is_a_noop() {
        let engine = new_engine().await;
        assert!(engine.stop(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn cluster_health_on_an_empty_store_is_unknown_with_zero_score() {
        let engine = new_engine().await;
        let health = engine.get_cluster_health().await;
        assert_eq!(health.overall, HealthStatus::Unknown);
        assert_eq!(health.score.raw, 0.0);
        assert_eq!(health.score.weighted, 0.0);
        assert!(health.checks.is_empty());
        assert!(health.active_alerts.is_empty());
    }

    #[tokio::test]
    async fn start_then_stop_drains_without_a_live_cluster_when_there_are_no_checks() {
        // With no registered checks the engine only has the janitor task to
        // drain, so this exercises the full start/stop lifecycle without
        // needing a reachable Kubernetes API.
        let engine = new_engine().await;
        engine.start().await.unwrap();
        assert!(engine.stop(Duration::from_secs(5)).await.is_ok());
    }
}
