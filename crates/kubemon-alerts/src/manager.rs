/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-alerts/src/manager.rs
 *
 * Alert manager (C5, spec §4.4): evaluates rules against incoming check
 * results in registration order, coalesces by fingerprint, enforces
 * cooldown and silences, dispatches through named channels, and keeps a
 * bounded, most-recent-first history. The cooldown check generalizes
 * `autoheal_controller::process_rule`'s
 * `last_exec + cooldown_duration > now` from a single CRD's status field to
 * an in-memory `lastFired` per rule.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::channel::{ChannelError, NotificationChannel};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use kubemon_types::{Alert, AlertSeverity, AlertStatus, CheckResult};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("channel '{0}' is not registered")]
    UnknownChannel(String),
    #[error(transparent)]
    Dispatch(#[from] ChannelError),
}

/// A single alerting rule. `predicate` decides whether a `CheckResult`
/// should fire this rule; `cooldown` bounds how often it may re-fire for
/// the same fingerprint.
pub struct AlertRule {
    pub name: String,
    pub predicate: Box<dyn Fn(&CheckResult) -> bool + Send + Sync>,
    pub severity: AlertSeverity,
    pub cooldown: ChronoDuration,
    pub channel_name: String,
    pub template: String,
    last_fired: Option<DateTime<Utc>>,
}

impl AlertRule {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&CheckResult) -> bool + Send + Sync + 'static,
        severity: AlertSeverity,
        cooldown: ChronoDuration,
        channel_name: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            severity,
            cooldown,
            channel_name: channel_name.into(),
            template: template.into(),
            last_fired: None,
        }
    }

    fn fingerprint(&self, result: &CheckResult) -> String {
        format!("{}:{}", self.name, result.name)
    }

    fn render(&self, result: &CheckResult) -> String {
        self.template
            .replace("{check}", &result.name)
            .replace("{status}", &format!("{:?}", result.status))
            .replace("{message}", &result.message)
    }
}

struct Inner {
    rules: Vec<AlertRule>,
    silences: HashMap<String, DateTime<Utc>>,
    history: VecDeque<Alert>,
    max_history: usize,
}

/// Owns rules, silences, and bounded history; dispatches through registered
/// channels. Mutations of rule state (cooldown, silences, history) are
/// serialized under a single lock held for the whole `process_check_result`
/// call, per spec §4.4/§5.
pub struct AlertManager {
    inner: Mutex<Inner>,
    channels: std::sync::RwLock<HashMap<String, Arc<dyn NotificationChannel>>>,
}

impl AlertManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rules: Vec::new(),
                silences: HashMap::new(),
                history: VecDeque::with_capacity(max_history),
                max_history,
            }),
            channels: std::sync::RwLock::new(HashMap::new()),
        }
    }

    pub fn register_channel(&self, channel: Arc<dyn NotificationChannel>) {
        self.channels
            .write()
            .expect("channel map lock poisoned")
            .insert(channel.name().to_string(), channel);
    }

    pub async fn add_rule(&self, rule: AlertRule) {
        self.inner.lock().await.rules.push(rule);
    }

    pub async fn silence_alert(&self, fingerprint: impl Into<String>, duration: ChronoDuration) {
        let expires = Utc::now() + duration;
        self.inner.lock().await.silences.insert(fingerprint.into(), expires);
    }

    /// Most-recent-first view of the bounded history, truncated to `limit`.
    pub async fn get_history(&self, limit: usize) -> Vec<Alert> {
        let inner = self.inner.lock().await;
        inner.history.iter().rev().take(limit).cloned().collect()
    }

    /// Currently-firing alerts, most-recent-first.
    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        let inner = self.inner.lock().await;
        inner
            .history
            .iter()
            .rev()
            .filter(|a| a.status == AlertStatus::Firing)
            .cloned()
            .collect()
    }

    /// Evaluates every rule against `result` in registration order. Rules
    /// that hold and are not in cooldown/silenced dispatch through their
    /// configured channel. Returns the first dispatch error encountered,
    /// after all rules have been processed once each (spec §4.4 step 4).
    pub async fn process_check_result(&self, result: &CheckResult) -> Result<(), AlertError> {
        let mut first_error = None;
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        evict_expired_silences(&mut inner.silences, now);

        for idx in 0..inner.rules.len() {
            let fires = (inner.rules[idx].predicate)(result);
            if !fires {
                continue;
            }

            let fingerprint = inner.rules[idx].fingerprint(result);
            if let Some(last_fired) = inner.rules[idx].last_fired {
                if now - last_fired < inner.rules[idx].cooldown {
                    continue;
                }
            }

            let silenced = inner
                .silences
                .get(&fingerprint)
                .is_some_and(|expires| *expires > now);

            let alert = Alert {
                id: Uuid::new_v4().to_string(),
                fingerprint: fingerprint.clone(),
                name: inner.rules[idx].name.clone(),
                severity: inner.rules[idx].severity,
                message: inner.rules[idx].render(result),
                source: result.name.clone(),
                timestamp: now,
                status: if silenced { AlertStatus::Silenced } else { AlertStatus::Firing },
                labels: result.labels.clone(),
            };

            if silenced {
                push_history(&mut inner.history, inner.max_history, alert);
                continue;
            }

            let channel_name = inner.rules[idx].channel_name.clone();
            let channel = self.channels.read().expect("channel map lock poisoned").get(&channel_name).cloned();

            inner.rules[idx].last_fired = Some(now);
            push_history(&mut inner.history, inner.max_history, alert.clone());

            kubemon_metrics::ALERTS_FIRED_TOTAL
                .with_label_values(&[&alert.name, &format!("{:?}", alert.severity)])
                .inc();

            match channel {
                None => {
                    if first_error.is_none() {
                        first_error = Some(AlertError::UnknownChannel(channel_name));
                    }
                }
                Some(channel) => {
                    if let Err(e) = channel.send(&alert).await {
                        if first_error.is_none() {
                            first_error = Some(AlertError::Dispatch(e));
                        }
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn push_history(history: &mut VecDeque<Alert>, capacity: usize, alert: Alert) {
    if history.len() >= capacity {
        history.pop_front();
    }
    history.push_back(alert);
}

fn evict_expired_silences(silences: &mut HashMap<String, DateTime<Utc>>, now: DateTime<Utc>) {
    silences.retain(|_, expires| *expires > now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LogChannel;
    use kubemon_types::{ErrorKind, HealthStatus};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unhealthy_result(name: &str) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            status: HealthStatus::Unhealthy,
            message: "down".into(),
            timestamp: Utc::now(),
            duration_ms: 0,
            details: BTreeMap::new(),
            metrics: vec![],
            error: Some(ErrorKind::Transient("probe failed".into())),
            confidence: 1.0,
            predictions: vec![],
            labels: BTreeMap::new(),
        }
    }

    struct CountingChannel {
        count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for CountingChannel {
        fn name(&self) -> &str {
            "counting"
        }
        async fn send(&self, _alert: &Alert) -> Result<(), ChannelError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeated_firing() {
        let manager = AlertManager::new(1000);
        let count = Arc::new(AtomicUsize::new(0));
        manager.register_channel(Arc::new(CountingChannel { count: count.clone() }));
        manager
            .add_rule(AlertRule::new(
                "rule1",
                |r: &CheckResult| r.status == HealthStatus::Unhealthy,
                AlertSeverity::Critical,
                ChronoDuration::hours(1),
                "counting",
                "{check} is {status}",
            ))
            .await;

        let result = unhealthy_result("checkA");
        manager.process_check_result(&result).await.unwrap();
        manager.process_check_result(&result).await.unwrap();
        manager.process_check_result(&result).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn silence_suppresses_dispatch_but_keeps_history() {
        let manager = AlertManager::new(1000);
        let count = Arc::new(AtomicUsize::new(0));
        manager.register_channel(Arc::new(CountingChannel { count: count.clone() }));
        manager
            .add_rule(AlertRule::new(
                "rule1",
                |r: &CheckResult| r.status == HealthStatus::Unhealthy,
                AlertSeverity::Critical,
                ChronoDuration::zero(),
                "counting",
                "down",
            ))
            .await;

        manager.silence_alert("rule1:checkA", ChronoDuration::seconds(10)).await;
        manager.process_check_result(&unhealthy_result("checkA")).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 0);
        let history = manager.get_history(100).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].fingerprint, "rule1:checkA");
        assert_eq!(history[0].status, AlertStatus::Silenced);
    }

    #[tokio::test]
    async fn missing_channel_reports_dispatch_error_but_other_rules_still_apply() {
        let manager = AlertManager::new(1000);
        let count = Arc::new(AtomicUsize::new(0));
        manager.register_channel(Arc::new(CountingChannel { count: count.clone() }));
        manager
            .add_rule(AlertRule::new(
                "missing-channel-rule",
                |r: &CheckResult| r.status == HealthStatus::Unhealthy,
                AlertSeverity::Warning,
                ChronoDuration::zero(),
                "does-not-exist",
                "down",
            ))
            .await;
        manager
            .add_rule(AlertRule::new(
                "working-rule",
                |r: &CheckResult| r.status == HealthStatus::Unhealthy,
                AlertSeverity::Warning,
                ChronoDuration::zero(),
                "counting",
                "down",
            ))
            .await;

        let err = manager.process_check_result(&unhealthy_result("checkA")).await.unwrap_err();
        assert!(matches!(err, AlertError::UnknownChannel(name) if name == "does-not-exist"));
        // The second rule still dispatched even though the first failed.
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let manager = AlertManager::new(2);
        manager.register_channel(Arc::new(LogChannel::new("log")));
        manager
            .add_rule(AlertRule::new(
                "rule1",
                |r: &CheckResult| r.status == HealthStatus::Unhealthy,
                AlertSeverity::Info,
                ChronoDuration::zero(),
                "log",
                "down",
            ))
            .await;

        for i in 0..5 {
            manager
                .process_check_result(&unhealthy_result(&format!("check{i}")))
                .await
                .unwrap();
        }

        assert_eq!(manager.get_history(100).await.len(), 2);
    }
}
