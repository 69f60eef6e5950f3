/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-context/src/manager.rs
 *
 * The cluster-context manager (C3, spec §4.2). Loads the declarative
 * profile file at startup, maintains a `currentContext` name, and lazily
 * populates a cache of `kube::Client`s keyed by profile name. Mutating
 * operations serialize through a single writer lock; readers take a read
 * lock, the same split the teacher uses for `autoheal_controller`'s
 * `rules_cache: Arc<RwLock<HashMap<..>>>`.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::profile::{ClusterProfile, ProfileFile, ProfileLoadError};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use kubemon_types::ContextProfile;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("no current context has been selected")]
    NoCurrentContext,
    #[error("unknown context '{0}'")]
    UnknownContext(String),
    #[error("failed to connect to context '{0}': {1}")]
    Connect(String, String),
    #[error(transparent)]
    Load(#[from] ProfileLoadError),
}

struct State {
    profiles: HashMap<String, ClusterProfile>,
    current: Option<String>,
    clients: HashMap<String, Client>,
}

/// Loads cluster connection profiles and hands out per-context API clients,
/// switching the active context on request.
pub struct ClusterContextManager {
    profile_path: PathBuf,
    state: RwLock<State>,
}

impl ClusterContextManager {
    /// Loads `profile_path` and selects `preferred_context` as current if it
    /// exists, falling back to the profile file's declared default, falling
    /// back again to the first profile in the file.
    pub async fn load(profile_path: PathBuf, preferred_context: Option<&str>) -> Result<Self, ContextError> {
        let file = ProfileFile::load(&profile_path)?;
        let profiles: HashMap<String, ClusterProfile> =
            file.clusters.into_iter().map(|c| (c.name.clone(), c)).collect();

        let current = preferred_context
            .filter(|name| profiles.contains_key(*name))
            .map(str::to_string)
            .or(file.default_context.filter(|name| profiles.contains_key(name)))
            .or_else(|| profiles.keys().next().cloned());

        Ok(Self {
            profile_path,
            state: RwLock::new(State {
                profiles,
                current,
                clients: HashMap::new(),
            }),
        })
    }

    /// Snapshot of all known profiles with `isCurrent` set on the active one.
    pub async fn list_contexts(&self) -> Vec<ContextProfile> {
        let state = self.state.read().await;
        let mut out: Vec<ContextProfile> = state
            .profiles
            .values()
            .map(|p| ContextProfile {
                name: p.name.clone(),
                cluster_endpoint: p.kubeconfig.clone(),
                default_namespace: p.default_namespace.clone(),
                is_current: state.current.as_deref() == Some(p.name.as_str()),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn get_current_context(&self) -> Result<ContextProfile, ContextError> {
        let state = self.state.read().await;
        let name = state.current.as_ref().ok_or(ContextError::NoCurrentContext)?;
        let profile = state.profiles.get(name).expect("current always names a known profile");
        Ok(ContextProfile {
            name: profile.name.clone(),
            cluster_endpoint: profile.kubeconfig.clone(),
            default_namespace: profile.default_namespace.clone(),
            is_current: true,
        })
    }

    /// Switches the active context. Does not invalidate other cached
    /// clients; best-effort probes the target but a probe failure does not
    /// stop the switch from taking effect (spec §4.2).
    pub async fn switch_context(&self, name: &str) -> Result<(), ContextError> {
        let mut state = self.state.write().await;
        if !state.profiles.contains_key(name) {
            return Err(ContextError::UnknownContext(name.to_string()));
        }
        state.current = Some(name.to_string());
        drop(state);

        if let Err(e) = self.probe(name).await {
            warn!(context = name, error = %e, "post-switch probe failed, switch still recorded");
        }
        info!(context = name, "active context switched");
        Ok(())
    }

    /// Returns the cached client for `name`, constructing and caching one on
    /// first use. Connect + probe both run under a 10s timeout.
    pub async fn get_client(&self, name: &str) -> Result<Client, ContextError> {
        {
            let state = self.state.read().await;
            if let Some(client) = state.clients.get(name) {
                return Ok(client.clone());
            }
            if !state.profiles.contains_key(name) {
                return Err(ContextError::UnknownContext(name.to_string()));
            }
        }

        let mut state = self.state.write().await;
        if let Some(client) = state.clients.get(name) {
            return Ok(client.clone());
        }
        let profile = state.profiles.get(name).expect("checked above").clone();
        let client = timeout(CONNECT_TIMEOUT, build_client(&profile))
            .await
            .map_err(|_| ContextError::Connect(name.to_string(), "connect timed out".into()))?
            .map_err(|e| ContextError::Connect(name.to_string(), e))?;
        state.clients.insert(name.to_string(), client.clone());
        Ok(client)
    }

    /// Reloads profiles from the declared source, clears the client cache,
    /// and preserves `currentContext` if it still exists; otherwise reverts
    /// to the profile-declared default.
    pub async fn refresh(&self) -> Result<(), ContextError> {
        let file = ProfileFile::load(&self.profile_path)?;
        let profiles: HashMap<String, ClusterProfile> =
            file.clusters.into_iter().map(|c| (c.name.clone(), c)).collect();

        let mut state = self.state.write().await;
        let current = state
            .current
            .take()
            .filter(|name| profiles.contains_key(name))
            .or(file.default_context.filter(|name| profiles.contains_key(name)))
            .or_else(|| profiles.keys().next().cloned());

        state.profiles = profiles;
        state.current = current;
        state.clients.clear();
        Ok(())
    }

    async fn probe(&self, name: &str) -> Result<(), String> {
        let client = self.get_client(name).await.map_err(|e| e.to_string())?;
        timeout(CONNECT_TIMEOUT, client.apiserver_version())
            .await
            .map_err(|_| "probe timed out".to_string())?
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

async fn build_client(profile: &ClusterProfile) -> Result<Client, String> {
    let client = if profile.kubeconfig.is_empty() {
        Client::try_default().await.map_err(|e| e.to_string())?
    } else {
        let kubeconfig = kube::config::Kubeconfig::read_from(&profile.kubeconfig).map_err(|e| e.to_string())?;
        let options = KubeConfigOptions::default();
        let config = Config::from_custom_kubeconfig(kubeconfig, &options).await.map_err(|e| e.to_string())?;
        Client::try_from(config).map_err(|e| e.to_string())?
    };

    // Cheap read used purely as a reachability probe before caching the client.
    client.apiserver_version().await.map_err(|e| e.to_string())?;
    Ok(client)
}
