/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-context/src/profile.rs
 *
 * Declarative profile file format describing one or more cluster
 * connection targets. Shaped after `multi_cluster_orchestrator::cluster_manager`'s
 * `ClustersConfig`/`Cluster` structs, trimmed to the fields the context
 * manager actually needs (endpoint, auth material reference, default
 * namespace, display name) instead of the orchestrator's deployment-strategy
 * metadata.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileLoadError {
    #[error("failed to read profile file '{0}': {1}")]
    Io(String, std::io::Error),
    #[error("failed to parse profile file '{0}': {1}")]
    Parse(String, serde_yaml::Error),
    #[error("profile file declares no clusters")]
    Empty,
}

/// One cluster connection target as declared in the profile file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterProfile {
    pub name: String,
    /// Path to a kubeconfig file, or empty to use in-cluster/default config.
    #[serde(default)]
    pub kubeconfig: String,
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFile {
    pub clusters: Vec<ClusterProfile>,
    /// Name of the profile that should be current when none is supplied by
    /// config/environment overrides.
    #[serde(default)]
    pub default_context: Option<String>,
}

impl ProfileFile {
    pub fn load(path: &Path) -> Result<Self, ProfileLoadError> {
        let path_str = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|e| ProfileLoadError::Io(path_str.clone(), e))?;
        let file: ProfileFile =
            serde_yaml::from_str(&contents).map_err(|e| ProfileLoadError::Parse(path_str, e))?;
        if file.clusters.is_empty() {
            return Err(ProfileLoadError::Empty);
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_parses_clusters_and_default_context() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "defaultContext: prod\nclusters:\n  - name: prod\n    kubeconfig: /etc/kubemon/prod.kubeconfig\n  - name: staging\n    kubeconfig: /etc/kubemon/staging.kubeconfig\n    defaultNamespace: staging-ns\n"
        )
        .unwrap();

        let parsed = ProfileFile::load(file.path()).unwrap();
        assert_eq!(parsed.default_context.as_deref(), Some("prod"));
        assert_eq!(parsed.clusters.len(), 2);
        assert_eq!(parsed.clusters[1].default_namespace, "staging-ns");
    }

    #[test]
    fn load_rejects_empty_cluster_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "clusters: []").unwrap();
        let err = ProfileFile::load(file.path()).unwrap_err();
        assert!(matches!(err, ProfileLoadError::Empty));
    }
}
