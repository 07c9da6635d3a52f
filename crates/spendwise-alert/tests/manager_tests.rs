// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert manager cooldowns, dispatch isolation, and observer wiring.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use spendwise_alert::{
    Alert, AlertManager, AlertRule, NotificationChannel, RulePredicate, Subject,
};
use spendwise_config::model::{AlertConfig, WebhookConfig};
use spendwise_core::{
    BudgetDefinition, Clock, Cost, Dimension, GroupKey, Labels, Period, Severity, SpendwiseError,
    StorageBackend, TimeRange, UsageEvent,
};
use spendwise_cost::{Anomaly, CostTracker, PricingTable};
use spendwise_forecast::{BudgetStatus, Projection, ProjectionBasis};
use spendwise_storage::MemoryStorage;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FixedClock(Mutex<DateTime<Utc>>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(Mutex::new(t0())))
}

/// Keeps every alert it receives; optionally fails each send.
#[derive(Default)]
struct Recorder {
    name: String,
    fail: bool,
    received: Mutex<Vec<Alert>>,
}

impl Recorder {
    fn named(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Self::default()
        })
    }

    fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: true,
            ..Self::default()
        })
    }

    fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationChannel for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<(), SpendwiseError> {
        if self.fail {
            return Err(SpendwiseError::DispatchFailure {
                channel: self.name.clone(),
                message: "refused".into(),
            });
        }
        self.received.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

fn event(agent: &str, usd: f64) -> Subject {
    let mut labels = Labels::new();
    labels.insert("agent_id".into(), agent.into());
    Subject::Event(UsageEvent {
        id: format!("{agent}-{usd}"),
        timestamp: t0(),
        model: "gpt-4".into(),
        input_tokens: 1000,
        output_tokens: 500,
        cost: Cost::from_usd(usd),
        labels,
    })
}

fn expensive_call() -> AlertRule {
    AlertRule::new(
        "expensive-call",
        RulePredicate::EventCostAbove(Cost::from_usd(0.05)),
        Severity::Warning,
    )
    .cooldown(TimeDelta::minutes(10))
    .scope_by([Dimension::label("agent_id")])
}

fn quiet_config() -> AlertConfig {
    AlertConfig {
        console: false,
        dispatch_timeout_secs: 1,
        ..AlertConfig::default()
    }
}

#[tokio::test]
async fn cooldown_suppresses_then_releases() {
    let manager = AlertManager::new(clock());
    let sink = Recorder::named("sink");
    manager.add_channel(sink.clone()).await;
    manager.add_rule(expensive_call()).await.unwrap();

    let subject = event("support", 0.06);
    let fired = manager.evaluate_at(&subject, t0()).await;
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].scope, "agent_id=support");

    let half = t0() + TimeDelta::minutes(5);
    assert!(manager.evaluate_at(&subject, half).await.is_empty());

    let after = t0() + TimeDelta::minutes(10) + TimeDelta::seconds(1);
    assert_eq!(manager.evaluate_at(&subject, after).await.len(), 1);
    assert_eq!(sink.count(), 2);
    assert_eq!(manager.last_fired("expensive-call", "agent_id=support").await, Some(after));
}

#[tokio::test]
async fn cooldown_is_per_scope() {
    let manager = AlertManager::new(clock());
    manager.add_channel(Recorder::named("sink")).await;
    manager.add_rule(expensive_call()).await.unwrap();

    assert_eq!(manager.evaluate_at(&event("support", 0.06), t0()).await.len(), 1);
    assert_eq!(manager.evaluate_at(&event("billing", 0.06), t0()).await.len(), 1);
    assert!(manager.evaluate_at(&event("support", 0.07), t0()).await.is_empty());
}

#[tokio::test]
async fn cheap_events_do_not_fire() {
    let manager = AlertManager::new(clock());
    let sink = Recorder::named("sink");
    manager.add_channel(sink.clone()).await;
    manager.add_rule(expensive_call()).await.unwrap();

    assert!(manager.evaluate(&event("support", 0.01)).await.is_empty());
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn failing_channel_does_not_block_others() {
    let manager = AlertManager::new(clock());
    let good = Recorder::named("good");
    manager.add_channel(Recorder::failing("bad")).await;
    manager.add_channel(good.clone()).await;
    manager.add_rule(expensive_call()).await.unwrap();

    let fired = manager.evaluate(&event("support", 0.06)).await;
    assert_eq!(fired.len(), 1);
    assert_eq!(good.count(), 1);

    let failures = manager.recent_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].channel, "bad");
    assert_eq!(failures[0].rule_id, "expensive-call");
    assert_eq!(failures[0].at, t0());
}

#[tokio::test]
async fn failure_history_is_bounded() {
    let config = AlertConfig {
        failure_history: 2,
        ..quiet_config()
    };
    let manager = AlertManager::from_config(&config, clock()).unwrap();
    manager.add_channel(Recorder::failing("bad")).await;
    manager
        .add_rule(expensive_call().cooldown(TimeDelta::zero()))
        .await
        .unwrap();

    for agent in ["a", "b", "c"] {
        manager.evaluate(&event(agent, 0.06)).await;
    }
    let scopes: Vec<String> = manager.recent_failures().into_iter().map(|f| f.scope).collect();
    assert_eq!(scopes, vec!["agent_id=b", "agent_id=c"]);
}

#[tokio::test]
async fn webhook_server_error_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let config = AlertConfig {
        webhooks: vec![WebhookConfig {
            name: "ops".into(),
            url: server.uri(),
            token: None,
            min_severity: Severity::Info,
        }],
        ..quiet_config()
    };
    let manager = AlertManager::from_config(&config, clock()).unwrap();
    manager.add_rule(expensive_call()).await.unwrap();

    let fired = manager.evaluate(&event("support", 0.06)).await;
    assert_eq!(fired.len(), 1);
    let failures = manager.recent_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].channel, "ops");
}

#[tokio::test]
async fn slow_webhook_is_abandoned_after_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let config = AlertConfig {
        webhooks: vec![WebhookConfig {
            name: "slow".into(),
            url: server.uri(),
            token: None,
            min_severity: Severity::Info,
        }],
        ..quiet_config()
    };
    let manager = AlertManager::from_config(&config, clock()).unwrap();
    let fast = Recorder::named("fast");
    manager.add_channel(fast.clone()).await;
    manager.add_rule(expensive_call()).await.unwrap();

    let started = Instant::now();
    manager.evaluate(&event("support", 0.06)).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(fast.count(), 1);
    assert_eq!(manager.recent_failures()[0].channel, "slow");
}

#[tokio::test]
async fn webhook_min_severity_skips_lower_alerts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = AlertConfig {
        webhooks: vec![WebhookConfig {
            name: "pager".into(),
            url: server.uri(),
            token: None,
            min_severity: Severity::Critical,
        }],
        ..quiet_config()
    };
    let manager = AlertManager::from_config(&config, clock()).unwrap();
    manager.add_rule(expensive_call()).await.unwrap();

    assert_eq!(manager.evaluate(&event("support", 0.06)).await.len(), 1);
    assert!(manager.recent_failures().is_empty());
}

#[tokio::test]
async fn budget_overrun_fires_once_per_slot() {
    let manager = AlertManager::new(clock());
    let sink = Recorder::named("sink");
    manager.add_channel(sink.clone()).await;
    manager
        .add_rule(AlertRule::new(
            "budget-overrun",
            RulePredicate::BudgetOverrun,
            Severity::Critical,
        ))
        .await
        .unwrap();

    let budget = BudgetDefinition {
        id: "b1".into(),
        amount: Cost::from_usd(1000.0),
        period: Period::Monthly,
        scope: vec![],
        created_at: t0(),
    };
    let status = BudgetStatus::assemble(
        &budget,
        Period::Monthly.window(t0()),
        0.4,
        Cost::from_usd(400.0),
        Projection {
            remainder: Cost::from_usd(700.0),
            basis: ProjectionBasis::Forecast,
        },
    );
    let subject = Subject::Budget(status);

    let fired = manager.evaluate(&subject).await;
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].scope, "monthly|*");
    assert_eq!(fired[0].subject, "budget");
    assert!(fired[0].message.contains("overage $100.000000"));
    assert!(manager.evaluate(&subject).await.is_empty());
}

#[tokio::test]
async fn anomaly_rule_uses_group_key_scope() {
    let manager = AlertManager::new(clock());
    manager.add_channel(Recorder::named("sink")).await;
    manager
        .add_rule(AlertRule::new(
            "spike",
            RulePredicate::AnomalyRatioAtLeast(3.0),
            Severity::Warning,
        ))
        .await
        .unwrap();

    let group_by = vec![Dimension::label("agent_id")];
    let anomaly = Anomaly {
        key: GroupKey(vec![Some("support".into())]),
        group_by,
        window: TimeRange::trailing(t0(), TimeDelta::hours(24)),
        baseline_average: Cost::from_usd(0.06),
        observed: Cost::from_usd(0.30),
        deviation_ratio: 5.0,
    };
    let fired = manager.evaluate(&Subject::Anomaly(anomaly)).await;
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].scope, "agent_id=support");
}

#[tokio::test]
async fn tracker_observer_evaluates_in_background() {
    let clock = clock();
    let manager = AlertManager::new(clock.clone());
    let sink = Recorder::named("sink");
    manager.add_channel(sink.clone()).await;
    manager.add_rule(expensive_call()).await.unwrap();

    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    let tracker = CostTracker::new(storage, PricingTable::new().with_model("gpt-4", 0.03, 0.06))
        .with_clock(clock)
        .with_observer(Arc::new(manager.clone()));

    let mut labels = Labels::new();
    labels.insert("agent_id".into(), "support".into());
    tracker.track_call("gpt-4", 1000, 500, labels).await.unwrap();

    for _ in 0..100 {
        if sink.count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(sink.count(), 1);
    assert_eq!(
        manager.last_fired("expensive-call", "agent_id=support").await,
        Some(t0())
    );
}
