/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-config/src/lib.rs
 *
 * Layered configuration loader (spec §6): a declarative YAML file,
 * overridden field-by-field by a fixed set of environment variables,
 * overridden in turn only in its own path by the single `--config <path>`
 * CLI argument the binary accepts. `serde_yaml` does the parsing, the same
 * crate the teacher reaches for in `policy_engine`'s rule files.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file '{0}': {1}")]
    Io(String, String),
    #[error("failed to parse configuration file '{0}': {1}")]
    Parse(String, String),
    #[error("invalid value for environment variable '{0}': '{1}'")]
    InvalidEnvValue(String, String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesConfig {
    pub kubeconfig: String,
    pub context: String,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self { kubeconfig: "clusters.yaml".to_string(), context: String::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringConfig {
    pub interval_ms: u64,
    pub enabled_checks: Vec<String>,
    pub max_history: usize,
    pub timeout_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            enabled_checks: Vec::new(),
            max_history: 1000,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    #[serde(rename = "type")]
    pub channel_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    pub predicate: String,
    pub severity: String,
    pub cooldown_ms: u64,
    pub channel: String,
    #[serde(default)]
    pub template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub channels: HashMap<String, ChannelConfig>,
    pub rules: HashMap<String, RuleConfig>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { enabled: true, channels: HashMap::new(), rules: HashMap::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiConfigSection {
    pub enabled: bool,
    pub executable_path: String,
    pub max_turns: u32,
    pub timeout_ms: u64,
    pub database_path: String,
}

impl Default for AiConfigSection {
    fn default() -> Self {
        Self {
            enabled: false,
            executable_path: String::new(),
            max_turns: 20,
            timeout_ms: 120_000,
            database_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_enabled: false,
            cors_origins: Vec::new(),
            read_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiConfig {
    pub refresh_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub theme: String,
    pub features: HashMap<String, bool>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 10_000,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 2_000,
            theme: "dark".to_string(),
            features: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub kubernetes: KubernetesConfig,
    pub monitoring: MonitoringConfig,
    pub alerts: AlertsConfig,
    pub ai: AiConfigSection,
    pub server: ServerConfig,
    pub ui: UiConfig,
}

fn default_true() -> bool {
    true
}

const DEFAULT_CONFIG_PATH: &str = "kubemon.yaml";

/// Loads configuration with the precedence file < environment < CLI (spec
/// §6). `cli_config_path` overrides only which file is read; every other
/// field is whatever the file declares, then whatever the fixed set of
/// environment variables below override.
pub fn load(cli_config_path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = cli_config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = if path.exists() {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e.to_string()))?;
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse(path.display().to_string(), e.to_string()))?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    if let Some(v) = env_str("KUBEMON_KUBERNETES_KUBECONFIG") {
        config.kubernetes.kubeconfig = v;
    }
    if let Some(v) = env_str("KUBEMON_KUBERNETES_CONTEXT") {
        config.kubernetes.context = v;
    }
    if let Some(v) = env_u64("KUBEMON_MONITORING_INTERVAL_MS")? {
        config.monitoring.interval_ms = v;
    }
    if let Some(v) = env_u64("KUBEMON_MONITORING_TIMEOUT_MS")? {
        config.monitoring.timeout_ms = v;
    }
    if let Some(v) = env_usize("KUBEMON_MONITORING_MAX_HISTORY")? {
        config.monitoring.max_history = v;
    }
    if let Some(v) = env_bool("KUBEMON_ALERTS_ENABLED")? {
        config.alerts.enabled = v;
    }
    if let Some(v) = env_bool("KUBEMON_AI_ENABLED")? {
        config.ai.enabled = v;
    }
    if let Some(v) = env_str("KUBEMON_AI_EXECUTABLE_PATH") {
        config.ai.executable_path = v;
    }
    if let Some(v) = env_u64("KUBEMON_AI_TIMEOUT_MS")? {
        config.ai.timeout_ms = v;
    }
    if let Some(v) = env_str("KUBEMON_AI_DATABASE_PATH") {
        config.ai.database_path = v;
    }
    if let Some(v) = env_str("KUBEMON_SERVER_HOST") {
        config.server.host = v;
    }
    if let Some(v) = env_u64("KUBEMON_SERVER_PORT")? {
        config.server.port = v as u16;
    }
    if let Some(v) = env_bool("KUBEMON_SERVER_CORS_ENABLED")? {
        config.server.cors_enabled = v;
    }
    Ok(())
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env_str(key) {
        None => Ok(None),
        Some(v) => v
            .parse::<bool>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvValue(key.to_string(), v)),
    }
}

fn env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env_str(key) {
        None => Ok(None),
        Some(v) => v
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvValue(key.to_string(), v)),
    }
}

fn env_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match env_str(key) {
        None => Ok(None),
        Some(v) => v
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvValue(key.to_string(), v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load(Some(Path::new("/nonexistent/kubemon.yaml"))).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.monitoring.interval_ms, 30_000);
    }

    #[test]
    fn file_values_are_applied() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 9999\nmonitoring:\n  maxHistory: 42\n").unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.monitoring.max_history, 42);
        // Unset fields keep their defaults.
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn cli_path_is_the_only_thing_that_changes_which_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 1234\n").unwrap();

        let from_default = load(None);
        let from_cli = load(Some(file.path())).unwrap();
        assert_eq!(from_cli.server.port, 1234);
        // Absent a KUBEMON_CONFIG env var or a real ./kubemon.yaml on the
        // test runner, the default path simply doesn't exist.
        if from_default.is_ok() {
            assert_ne!(from_default.unwrap().server.port, 1234);
        }
    }
}
