/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-alerts/src/channel.rs
 *
 * Notification channel abstraction. The core ships a log channel; external
 * channels (webhook, email) are registered by the surrounding program
 * (spec §4.4). The webhook channel generalizes
 * `notification_manager::send_slack_message`'s `reqwest::Client::post(..).json(..)`
 * pattern from a Slack-specific payload to an arbitrary JSON alert body.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use async_trait::async_trait;
use kubemon_types::Alert;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel '{0}' send failed: {1}")]
    SendFailed(String, String),
}

/// Sends alerts somewhere. `send` must be safe to call repeatedly for the
/// same alert (idempotent semantics, spec §4.4).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, alert: &Alert) -> Result<(), ChannelError>;
}

/// Ships with the core: logs the alert at `warn` (critical) or `info`
/// (everything else) via `tracing`.
pub struct LogChannel {
    name: String,
}

impl LogChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        match alert.severity {
            kubemon_types::AlertSeverity::Critical => {
                tracing::warn!(fingerprint = %alert.fingerprint, message = %alert.message, "alert firing")
            }
            _ => tracing::info!(fingerprint = %alert.fingerprint, message = %alert.message, "alert firing"),
        }
        Ok(())
    }
}

/// Posts the alert as a JSON body to a configured webhook URL.
pub struct WebhookChannel {
    name: String,
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookChannel {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        self.client
            .post(&self.url)
            .timeout(self.timeout)
            .json(alert)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(self.name.clone(), e.to_string()))?
            .error_for_status()
            .map_err(|e| ChannelError::SendFailed(self.name.clone(), e.to_string()))?;
        Ok(())
    }
}
