// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule evaluation, per-scope cooldowns, and fan-out dispatch.
//!
//! Every channel send is bounded by the dispatch timeout and runs
//! concurrently with the others. Failures are recorded in a bounded ring
//! buffer and never returned to the caller.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use spendwise_config::model::AlertConfig;
use spendwise_core::{Clock, SpendwiseError, UsageEvent, UsageObserver};
use spendwise_cost::recording;

use crate::channel::{ConsoleChannel, NotificationChannel};
use crate::email::EmailChannel;
use crate::rule::{Alert, AlertRule, Subject};
use crate::webhook::WebhookChannel;

/// A delivery that failed or timed out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchFailureRecord {
    pub channel: String,
    pub rule_id: String,
    pub scope: String,
    pub at: DateTime<Utc>,
    pub message: String,
}

type ChannelMap = BTreeMap<String, Arc<dyn NotificationChannel>>;

struct Inner {
    enabled: bool,
    clock: Arc<dyn Clock>,
    dispatch_timeout: Duration,
    default_cooldown: TimeDelta,
    failure_history: usize,
    rules: RwLock<Vec<AlertRule>>,
    channels: RwLock<ChannelMap>,
    /// Last firing per (rule id, scope).
    last_fired: Mutex<HashMap<(String, String), DateTime<Utc>>>,
    failures: StdMutex<VecDeque<DispatchFailureRecord>>,
}

/// Evaluates alert rules and delivers alerts. Cheap to clone.
#[derive(Clone)]
pub struct AlertManager {
    inner: Arc<Inner>,
}

impl AlertManager {
    /// Manager with default settings and no channels.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let config = AlertConfig {
            console: false,
            ..AlertConfig::default()
        };
        Self::with_channels(&config, clock, ChannelMap::new())
    }

    /// Build the manager and every channel named in `config`.
    pub fn from_config(config: &AlertConfig, clock: Arc<dyn Clock>) -> Result<Self, SpendwiseError> {
        let timeout = Duration::from_secs(config.dispatch_timeout_secs);
        let mut channels = ChannelMap::new();
        if config.console {
            let console: Arc<dyn NotificationChannel> = Arc::new(ConsoleChannel::new());
            channels.insert(console.name().to_string(), console);
        }
        for webhook in &config.webhooks {
            let channel = WebhookChannel::new(webhook, timeout)?;
            insert_unique(&mut channels, Arc::new(channel))?;
        }
        if let Some(email) = &config.email {
            let channel = EmailChannel::new(email, timeout)?;
            insert_unique(&mut channels, Arc::new(channel))?;
        }
        debug!(channels = channels.len(), enabled = config.enabled, "alert manager configured");
        Ok(Self::with_channels(config, clock, channels))
    }

    fn with_channels(config: &AlertConfig, clock: Arc<dyn Clock>, channels: ChannelMap) -> Self {
        let default_cooldown = i64::try_from(config.default_cooldown_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            inner: Arc::new(Inner {
                enabled: config.enabled,
                clock,
                dispatch_timeout: Duration::from_secs(config.dispatch_timeout_secs),
                default_cooldown,
                failure_history: config.failure_history,
                rules: RwLock::new(Vec::new()),
                channels: RwLock::new(channels),
                last_fired: Mutex::new(HashMap::new()),
                failures: StdMutex::new(VecDeque::new()),
            }),
        }
    }

    /// Register a channel, replacing any channel with the same name.
    pub async fn add_channel(&self, channel: Arc<dyn NotificationChannel>) {
        let name = channel.name().to_string();
        if self.inner.channels.write().await.insert(name.clone(), channel).is_some() {
            debug!(channel = %name, "channel replaced");
        }
    }

    pub async fn channel_names(&self) -> Vec<String> {
        self.inner.channels.read().await.keys().cloned().collect()
    }

    /// Register a rule. Its id must be unique and every channel it names
    /// must already be registered.
    pub async fn add_rule(&self, rule: AlertRule) -> Result<(), SpendwiseError> {
        {
            let channels = self.inner.channels.read().await;
            if let Some(missing) = rule.channels.iter().find(|c| !channels.contains_key(*c)) {
                return Err(SpendwiseError::Config(format!(
                    "rule `{}` names unknown channel `{missing}`",
                    rule.id
                )));
            }
        }
        let mut rules = self.inner.rules.write().await;
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(SpendwiseError::Config(format!(
                "rule `{}` is already registered",
                rule.id
            )));
        }
        debug!(rule = %rule.id, severity = %rule.severity, "alert rule added");
        rules.push(rule);
        Ok(())
    }

    /// Remove a rule and forget its firing history.
    pub async fn remove_rule(&self, id: &str) -> bool {
        let removed = {
            let mut rules = self.inner.rules.write().await;
            let before = rules.len();
            rules.retain(|r| r.id != id);
            rules.len() != before
        };
        if removed {
            self.inner.last_fired.lock().await.retain(|(rule, _), _| rule != id);
        }
        removed
    }

    pub async fn rule_ids(&self) -> Vec<String> {
        self.inner.rules.read().await.iter().map(|r| r.id.clone()).collect()
    }

    /// Evaluate every rule against `subject` at the clock's current time.
    pub async fn evaluate(&self, subject: &Subject) -> Vec<Alert> {
        self.evaluate_at(subject, self.inner.clock.now()).await
    }

    /// Evaluate every rule against `subject` as of `now`. Returns the alerts
    /// that fired; delivery outcomes are in [`recent_failures`](Self::recent_failures).
    pub async fn evaluate_at(&self, subject: &Subject, now: DateTime<Utc>) -> Vec<Alert> {
        if !self.inner.enabled {
            return Vec::new();
        }
        let rules = self.inner.rules.read().await.clone();
        let mut fired = Vec::new();
        for rule in rules.iter().filter(|r| r.matches(subject)) {
            let scope = subject.scope(&rule.scope_by);
            if !self.claim(rule, &scope, now).await {
                debug!(rule = %rule.id, scope = %scope, "alert suppressed by cooldown");
                continue;
            }
            let alert = Alert {
                rule_id: rule.id.clone(),
                severity: rule.severity,
                scope,
                scope_values: subject.scope_values(&rule.scope_by),
                subject: subject.kind(),
                timestamp: now,
                message: subject.describe(),
            };
            recording::record_alert(&alert.rule_id, alert.severity);
            info!(
                rule = %alert.rule_id,
                severity = %alert.severity,
                scope = %alert.scope,
                "alert fired"
            );
            self.dispatch(rule, &alert).await;
            fired.push(alert);
        }
        fired
    }

    /// Record a firing for (rule, scope) unless it is still cooling down.
    async fn claim(&self, rule: &AlertRule, scope: &str, now: DateTime<Utc>) -> bool {
        let cooldown = rule.cooldown.unwrap_or(self.inner.default_cooldown);
        let mut last_fired = self.inner.last_fired.lock().await;
        let key = (rule.id.clone(), scope.to_string());
        if let Some(last) = last_fired.get(&key) {
            if now.signed_duration_since(*last) < cooldown {
                return false;
            }
        }
        last_fired.insert(key, now);
        true
    }

    async fn dispatch(&self, rule: &AlertRule, alert: &Alert) {
        let targets: Vec<Arc<dyn NotificationChannel>> = {
            let channels = self.inner.channels.read().await;
            if rule.channels.is_empty() {
                channels.values().cloned().collect()
            } else {
                rule.channels
                    .iter()
                    .filter_map(|name| channels.get(name).cloned())
                    .collect()
            }
        };

        let timeout = self.inner.dispatch_timeout;
        let sends = targets
            .into_iter()
            .filter(|channel| channel.accepts(alert.severity))
            .map(|channel| async move {
                let result = match tokio::time::timeout(timeout, channel.send(alert)).await {
                    Ok(result) => result,
                    Err(_) => Err(SpendwiseError::DispatchFailure {
                        channel: channel.name().to_string(),
                        message: format!("timed out after {}ms", timeout.as_millis()),
                    }),
                };
                (channel, result)
            });

        for (channel, result) in join_all(sends).await {
            if let Err(e) = result {
                self.record_failure(channel.name(), alert, &e);
            }
        }
    }

    fn record_failure(&self, channel: &str, alert: &Alert, error: &SpendwiseError) {
        recording::record_dispatch_failure(channel);
        warn!(
            channel = %channel,
            rule = %alert.rule_id,
            scope = %alert.scope,
            error = %error,
            "alert dispatch failed"
        );
        if self.inner.failure_history == 0 {
            return;
        }
        let mut failures = self
            .inner
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while failures.len() >= self.inner.failure_history {
            failures.pop_front();
        }
        failures.push_back(DispatchFailureRecord {
            channel: channel.to_string(),
            rule_id: alert.rule_id.clone(),
            scope: alert.scope.clone(),
            at: self.inner.clock.now(),
            message: error.to_string(),
        });
    }

    /// Recorded dispatch failures, oldest first.
    pub fn recent_failures(&self) -> Vec<DispatchFailureRecord> {
        self.inner
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// When `rule_id` last fired for `scope`.
    pub async fn last_fired(&self, rule_id: &str, scope: &str) -> Option<DateTime<Utc>> {
        self.inner
            .last_fired
            .lock()
            .await
            .get(&(rule_id.to_string(), scope.to_string()))
            .copied()
    }

    /// Evaluate on a background task so the caller never waits on dispatch.
    /// Returns `None` outside a Tokio runtime.
    pub fn spawn_evaluate(&self, subject: Subject) -> Option<JoinHandle<Vec<Alert>>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let manager = self.clone();
        let now = self.inner.clock.now();
        Some(handle.spawn(async move { manager.evaluate_at(&subject, now).await }))
    }
}

fn insert_unique(
    channels: &mut ChannelMap,
    channel: Arc<dyn NotificationChannel>,
) -> Result<(), SpendwiseError> {
    let name = channel.name().to_string();
    if channels.contains_key(&name) {
        return Err(SpendwiseError::Config(format!(
            "duplicate alert channel name `{name}`"
        )));
    }
    channels.insert(name, channel);
    Ok(())
}

impl UsageObserver for AlertManager {
    fn on_event(&self, event: &UsageEvent) {
        if !self.inner.enabled {
            return;
        }
        if self.spawn_evaluate(Subject::Event(event.clone())).is_none() {
            warn!(event = %event.id, "no async runtime, event not evaluated for alerts");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RulePredicate;
    use async_trait::async_trait;
    use spendwise_core::{Cost, Labels, Severity, SystemClock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl NotificationChannel for Counting {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, _alert: &Alert) -> Result<(), SpendwiseError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event(usd: f64) -> Subject {
        Subject::Event(UsageEvent {
            id: "e".into(),
            timestamp: Utc::now(),
            model: "gpt-4".into(),
            input_tokens: 10,
            output_tokens: 10,
            cost: Cost::from_usd(usd),
            labels: Labels::new(),
        })
    }

    fn any_event() -> AlertRule {
        AlertRule::new("any", RulePredicate::custom(|_| true), Severity::Info)
    }

    #[tokio::test]
    async fn rule_with_unknown_channel_is_rejected() {
        let manager = AlertManager::new(Arc::new(SystemClock));
        let err = manager.add_rule(any_event().channels(["pager"])).await;
        assert!(matches!(err, Err(SpendwiseError::Config(_))));
    }

    #[tokio::test]
    async fn duplicate_rule_id_is_rejected() {
        let manager = AlertManager::new(Arc::new(SystemClock));
        manager.add_rule(any_event()).await.unwrap();
        assert!(manager.add_rule(any_event()).await.is_err());
        assert!(manager.remove_rule("any").await);
        assert!(manager.add_rule(any_event()).await.is_ok());
    }

    #[tokio::test]
    async fn routes_to_named_channels_only() {
        let manager = AlertManager::new(Arc::new(SystemClock));
        let a = Arc::new(Counting { name: "a", sent: AtomicUsize::new(0) });
        let b = Arc::new(Counting { name: "b", sent: AtomicUsize::new(0) });
        manager.add_channel(a.clone()).await;
        manager.add_channel(b.clone()).await;
        manager.add_rule(any_event().channels(["b"])).await.unwrap();

        let fired = manager.evaluate(&event(1.0)).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(a.sent.load(Ordering::SeqCst), 0);
        assert_eq!(b.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_manager_never_fires() {
        let config = AlertConfig {
            enabled: false,
            console: false,
            ..AlertConfig::default()
        };
        let manager = AlertManager::from_config(&config, Arc::new(SystemClock)).unwrap();
        manager.add_rule(any_event()).await.unwrap();
        assert!(manager.evaluate(&event(1.0)).await.is_empty());
    }

    #[tokio::test]
    async fn from_config_registers_console() {
        let manager =
            AlertManager::from_config(&AlertConfig::default(), Arc::new(SystemClock)).unwrap();
        assert_eq!(manager.channel_names().await, vec!["console".to_string()]);
    }
}
