/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-ai/src/invoker.rs
 *
 * AI invocation wrapper (C7, spec §4.6). Dispatches one of four semantic
 * modes to an external executable over argv + stdin JSON, never through a
 * shell, the same discipline `preview_controller`'s
 * `Command::new("kubectl").args([..])` follows. `kill_on_drop` gives us
 * deadline enforcement for free: dropping the timed-out future drops the
 * child, which tokio then kills.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::circuit::{CircuitBreaker, CircuitOpenError};
use crate::session_log::SessionLog;
use kubemon_types::{AlertSeverity, CheckResult, HealthPrediction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiMode {
    AnalyzeDiagnostic,
    AnalyzeHealing,
    Predict,
    QueryAssistant,
}

impl AiMode {
    fn as_arg(self) -> &'static str {
        match self {
            AiMode::AnalyzeDiagnostic => "analyze-diagnostic",
            AiMode::AnalyzeHealing => "analyze-healing",
            AiMode::Predict => "predict",
            AiMode::QueryAssistant => "query-assistant",
        }
    }
}

/// Parsed response contract every mode must satisfy (spec §4.6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    pub summary: String,
    pub diagnosis: String,
    pub confidence: f64,
    pub severity: AlertSeverity,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// A single remediation suggestion (spec §4.6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub impact: String,
}

/// A single executable remediation action (spec §4.6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub command: String,
    pub requires_approval: bool,
    pub is_automatic: bool,
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("executable '{0}' failed path validation: {1}")]
    PathValidation(String, String),
    #[error("failed to spawn AI subprocess: {0}")]
    Spawn(String),
    #[error("AI subprocess exceeded its deadline and was terminated")]
    Timeout,
    #[error("AI subprocess exited with status {0:?}: {1}")]
    NonZeroExit(Option<i32>, String),
    #[error("AI subprocess returned a response that did not match the expected schema: {raw}")]
    MalformedResponse { raw: String },
    #[error("circuit breaker is open, rejecting call without invoking the subprocess")]
    CircuitOpen,
}

impl From<CircuitOpenError> for AiError {
    fn from(_: CircuitOpenError) -> Self {
        AiError::CircuitOpen
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub executable: PathBuf,
    /// When non-empty, the resolved executable path must be one of these;
    /// an empty list means any executable `which` can resolve is trusted.
    pub allowed_paths: Vec<PathBuf>,
    pub timeout: Duration,
    pub circuit_threshold: u32,
    pub circuit_reset_timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("kubemon-ai-agent"),
            allowed_paths: Vec::new(),
            timeout: Duration::from_secs(120),
            circuit_threshold: 5,
            circuit_reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Resolves and validates `config.executable`, then dispatches requests to
/// it, gated by a circuit breaker.
pub struct AiInvoker {
    executable: PathBuf,
    timeout: Duration,
    breaker: CircuitBreaker,
    session_log: Option<Arc<SessionLog>>,
}

impl AiInvoker {
    /// Resolves the configured executable via `which` (so a bare name like
    /// `kubemon-ai-agent` is looked up on PATH the same way a shell would),
    /// then, if an allow-list was configured, rejects anything outside it.
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let resolved = which::which(&config.executable)
            .map_err(|e| AiError::PathValidation(config.executable.display().to_string(), e.to_string()))?;

        if !config.allowed_paths.is_empty() && !config.allowed_paths.iter().any(|p| p == &resolved) {
            return Err(AiError::PathValidation(
                resolved.display().to_string(),
                "resolved path is not in the configured allow-list".to_string(),
            ));
        }

        Ok(Self {
            executable: resolved,
            timeout: config.timeout,
            breaker: CircuitBreaker::new(config.circuit_threshold, config.circuit_reset_timeout),
            session_log: None,
        })
    }

    /// Attaches an optional session transcript log (spec §4.6.4). Every
    /// subsequent invocation records its request and outcome as two turns
    /// under a fresh, per-call session id.
    pub fn with_session_log(mut self, log: Arc<SessionLog>) -> Self {
        self.session_log = Some(log);
        self
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable
    }

    pub fn circuit_state(&self) -> kubemon_types::CircuitState {
        self.breaker.state()
    }

    pub async fn analyze_diagnostic(&self, result: &CheckResult) -> Result<AiResponse, AiError> {
        self.invoke(AiMode::AnalyzeDiagnostic, json!({ "result": result })).await
    }

    pub async fn analyze_healing(&self, result: &CheckResult) -> Result<AiResponse, AiError> {
        self.invoke(AiMode::AnalyzeHealing, json!({ "result": result })).await
    }

    pub async fn predict(&self, history: &[CheckResult]) -> Result<Vec<HealthPrediction>, AiError> {
        let response = self.invoke(AiMode::Predict, json!({ "history": history })).await?;
        Ok(vec![HealthPrediction {
            summary: response.summary,
            confidence: response.confidence,
            horizon: response.diagnosis,
        }])
    }

    pub async fn query_assistant(&self, question: &str) -> Result<AiResponse, AiError> {
        self.invoke(AiMode::QueryAssistant, json!({ "question": question })).await
    }

    async fn invoke(&self, mode: AiMode, request: serde_json::Value) -> Result<AiResponse, AiError> {
        let permit = self.breaker.try_acquire()?;
        let session_id = Uuid::new_v4().to_string();
        self.log_turn(&session_id, "request", &request.to_string()).await;

        let start = std::time::Instant::now();
        let result = self.run_subprocess(mode, request).await;
        kubemon_metrics::AI_INVOCATION_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                self.breaker.report_success(permit);
                kubemon_metrics::AI_INVOCATIONS_TOTAL.with_label_values(&[mode.as_arg(), "success"]).inc();
                self.log_turn(&session_id, "response", &serde_json::to_string(&response).unwrap_or_default())
                    .await;
                Ok(response)
            }
            Err(e) => {
                self.breaker.report_failure(permit);
                kubemon_metrics::AI_INVOCATIONS_TOTAL.with_label_values(&[mode.as_arg(), "failure"]).inc();
                self.log_turn(&session_id, "error", &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn log_turn(&self, session_id: &str, role: &str, content: &str) {
        if let Some(log) = &self.session_log {
            if let Err(e) = log.record(session_id, role, content).await {
                tracing::warn!(error = %e, "failed to append AI session log entry");
            }
        }
    }

    async fn run_subprocess(&self, mode: AiMode, request: serde_json::Value) -> Result<AiResponse, AiError> {
        let mut command = Command::new(&self.executable);
        command
            .arg(mode.as_arg())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| AiError::Spawn(e.to_string()))?;
        let payload = serde_json::to_vec(&request).expect("request is always serializable");

        let mut stdin = child.stdin.take().expect("stdin was piped at spawn");
        stdin
            .write_all(&payload)
            .await
            .map_err(|e| AiError::Spawn(e.to_string()))?;
        drop(stdin);

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(AiError::Spawn(e.to_string())),
            Err(_) => return Err(AiError::Timeout),
        };

        if !output.status.success() {
            return Err(AiError::NonZeroExit(
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        serde_json::from_slice(&output.stdout).map_err(|_| AiError::MalformedResponse {
            raw: String::from_utf8_lossy(&output.stdout).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_an_executable_that_cannot_be_resolved() {
        let config = AiConfig {
            executable: PathBuf::from("kubemon-ai-agent-definitely-not-on-path"),
            ..AiConfig::default()
        };
        assert!(matches!(AiInvoker::new(config), Err(AiError::PathValidation(_, _))));
    }

    #[test]
    fn new_rejects_a_resolved_path_outside_the_allow_list() {
        // `sh` resolves on any POSIX system this test would plausibly run on,
        // but it is deliberately excluded from the allow-list below.
        let config = AiConfig {
            executable: PathBuf::from("sh"),
            allowed_paths: vec![PathBuf::from("/nonexistent/only-this-one")],
            ..AiConfig::default()
        };
        if which::which("sh").is_ok() {
            assert!(matches!(AiInvoker::new(config), Err(AiError::PathValidation(_, _))));
        }
    }
}
