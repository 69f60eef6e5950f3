/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-checks/src/lib.rs
 *
 * This crate defines the polymorphic health-check contract (C1) and the
 * check registry (C2) described in the spec's §4.1. A health check is
 * anything that can identify itself, accept configuration, and run once
 * against a Kubernetes API client under a deadline. The registry keeps a
 * deduplicated, concurrency-safe set of checks by name.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

pub mod builtin;
pub mod registry;

use async_trait::async_trait;
use kubemon_types::{CheckResult, Criticality};
use kube::Client;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

pub use registry::{CheckRegistry, RegistryError};

/// Error surface for `HealthCheck::configure`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Error surface for `HealthCheck::run`. A `Transient` error is recorded and
/// the check is retried on the next tick unmodified; a `Permanent` error is
/// recorded and the worker stays scheduled (spec §4.3, §7).
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
}

/// A single named probe producing a status and metrics.
///
/// `run` must be idempotent and safe to cancel mid-flight: callers may abort
/// the future at the deadline and any partial work must simply be dropped,
/// never leave shared state half-updated.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Stable, unique name. Used as the registry key and as the alert
    /// fingerprint component.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Advisory scheduling interval; the engine may coalesce or skip ticks
    /// but never queues missed ones.
    fn interval(&self) -> Duration;

    /// Drives the weight this check's status carries in the cluster score.
    fn criticality(&self) -> Criticality;

    /// Applies check-specific configuration. Implementations should reject
    /// unknown keys and out-of-range values with `ConfigError` rather than
    /// silently ignoring them.
    fn configure(&mut self, _settings: &serde_json::Value) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Executes one probe. `client` is the API client for the *active*
    /// cluster context at the moment the tick fired; `deadline` is the
    /// instant after which the engine will stop polling this future.
    async fn run(&self, client: Client, deadline: Instant) -> Result<CheckResult, CheckError>;
}
