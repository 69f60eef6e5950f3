/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-engine/src/store.rs
 *
 * Result store owned exclusively by the engine (spec §3 ownership note): a
 * name-keyed map of the latest `CheckResult` per check, with a TTL janitor
 * sweeping stale entries. Shares the `RwLock<HashMap<..>>` split used
 * throughout this workspace for read-mostly shared state.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use chrono::{DateTime, Utc};
use kubemon_types::CheckResult;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Latest result per check name, with lazy TTL-based eviction.
#[derive(Default)]
pub struct ResultStore {
    results: RwLock<HashMap<String, CheckResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self { results: RwLock::new(HashMap::new()) }
    }

    pub async fn insert(&self, result: CheckResult) {
        self.results.write().await.insert(result.name.clone(), result);
    }

    pub async fn get(&self, name: &str) -> Option<CheckResult> {
        self.results.read().await.get(name).cloned()
    }

    /// Snapshot of every currently-stored result, sorted by name for
    /// deterministic presentation.
    pub async fn get_all(&self) -> Vec<CheckResult> {
        let mut all: Vec<CheckResult> = self.results.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Mutates `details` for the named result under the store's lock, used
    /// for AI enrichment that arrives after the originating tick has
    /// already written its result (spec §4.3 step 4).
    pub async fn enrich_details(&self, name: &str, key: &str, value: serde_json::Value) {
        if let Some(result) = self.results.write().await.get_mut(name) {
            result.details.insert(key.to_string(), value);
        }
    }

    /// Evicts results older than `ttl`. Returns the number evicted.
    pub async fn evict_older_than(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> usize {
        let mut guard = self.results.write().await;
        let before = guard.len();
        guard.retain(|_, result| now - result.timestamp < ttl);
        before - guard.len()
    }
}
