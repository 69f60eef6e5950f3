/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-checks/src/registry.rs
 *
 * The check registry (C2): a deduplicated, name-keyed set of health checks,
 * safe under concurrent access. Modeled after the `Arc<RwLock<HashMap<..>>>`
 * shared-cache idiom the teacher uses for `autoheal_controller`'s
 * `rules_cache`, generalized from a reconciler cache to a check registry.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::HealthCheck;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a check named '{0}' is already registered")]
    DuplicateName(String),
}

/// Deduplicated set of checks by name, safe under concurrent access.
#[derive(Default)]
pub struct CheckRegistry {
    checks: RwLock<HashMap<String, Arc<dyn HealthCheck>>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self {
            checks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, check: Arc<dyn HealthCheck>) -> Result<(), RegistryError> {
        let mut guard = self.checks.write().await;
        let name = check.name().to_string();
        if guard.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        guard.insert(name, check);
        Ok(())
    }

    pub async fn unregister(&self, name: &str) -> Option<Arc<dyn HealthCheck>> {
        self.checks.write().await.remove(name)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn HealthCheck>> {
        self.checks.read().await.get(name).cloned()
    }

    pub async fn list(&self) -> Vec<Arc<dyn HealthCheck>> {
        self.checks.read().await.values().cloned().collect()
    }

    pub async fn list_names(&self) -> Vec<String> {
        self.checks.read().await.keys().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.checks.read().await.len()
    }

    pub async fn clear(&self) {
        self.checks.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CheckError, HealthCheck};
    use async_trait::async_trait;
    use kube::Client;
    use kubemon_types::{Criticality, HealthStatus};
    use std::time::Duration;
    use tokio::time::Instant;

    struct Dummy(&'static str);

    #[async_trait]
    impl HealthCheck for Dummy {
        fn name(&self) -> &str {
            self.0
        }
        fn interval(&self) -> Duration {
            Duration::from_secs(1)
        }
        fn criticality(&self) -> Criticality {
            Criticality::Low
        }
        async fn run(&self, _client: Client, _deadline: Instant) -> Result<kubemon_types::CheckResult, CheckError> {
            Ok(kubemon_types::CheckResult {
                name: self.0.to_string(),
                status: HealthStatus::Healthy,
                message: String::new(),
                timestamp: chrono::Utc::now(),
                duration_ms: 0,
                details: Default::default(),
                metrics: vec![],
                error: None,
                confidence: 1.0,
                predictions: vec![],
                labels: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn register_rejects_duplicate_names() {
        let registry = CheckRegistry::new();
        registry.register(Arc::new(Dummy("pods"))).await.unwrap();
        let err = registry.register(Arc::new(Dummy("pods"))).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(name) if name == "pods"));
    }

    #[tokio::test]
    async fn unregister_and_list_roundtrip() {
        let registry = CheckRegistry::new();
        registry.register(Arc::new(Dummy("pods"))).await.unwrap();
        registry.register(Arc::new(Dummy("nodes"))).await.unwrap();
        assert_eq!(registry.count().await, 2);

        let mut names = registry.list_names().await;
        names.sort();
        assert_eq!(names, vec!["nodes".to_string(), "pods".to_string()]);

        assert!(registry.unregister("pods").await.is_some());
        assert_eq!(registry.count().await, 1);
        assert!(registry.get("pods").await.is_none());
    }
}
