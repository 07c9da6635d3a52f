// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles storage, the cost tracker, forecaster, budget
//! tracker, and alert manager around one [`FixedClock`], with a
//! [`RecordingChannel`] registered as `sink`.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use spendwise_alert::{Alert, AlertManager, Subject};
use spendwise_config::model::{AlertConfig, BudgetConfig, ForecastConfig};
use spendwise_core::{Clock, Labels, SpendwiseError, UsageEvent};
use spendwise_cost::{CostTracker, PricingTable};
use spendwise_forecast::{BudgetTracker, Forecaster};
use spendwise_storage::{Backend, MemoryStorage, SqliteStorage};

use crate::fixtures::{FixedClock, pricing_fixture};
use crate::mock_channel::RecordingChannel;

/// Name the harness registers its recording channel under.
pub const SINK: &str = "sink";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    start: DateTime<Utc>,
    sqlite: bool,
    pricing: PricingTable,
    forecast: ForecastConfig,
    budget: BudgetConfig,
    alert: AlertConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            start: Utc
                .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            sqlite: false,
            pricing: pricing_fixture(),
            forecast: ForecastConfig::default(),
            budget: BudgetConfig::default(),
            alert: AlertConfig {
                console: false,
                ..AlertConfig::default()
            },
        }
    }

    /// Initial clock reading.
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    /// Use a temp-file SQLite database instead of memory.
    pub fn with_sqlite(mut self) -> Self {
        self.sqlite = true;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_budget_config(mut self, config: BudgetConfig) -> Self {
        self.budget = config;
        self
    }

    pub fn with_alert_config(mut self, config: AlertConfig) -> Self {
        self.alert = config;
        self
    }

    /// Build the harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, SpendwiseError> {
        let (backend, temp_dir) = if self.sqlite {
            let temp_dir = tempfile::TempDir::new()
                .map_err(|e| SpendwiseError::Internal(format!("temp dir: {e}")))?;
            let path = temp_dir.path().join("usage.db");
            let storage = SqliteStorage::open(&path.to_string_lossy(), true).await?;
            (Backend::from_shared(storage), Some(temp_dir))
        } else {
            (Backend::from_shared(MemoryStorage::new()), None)
        };

        let clock = FixedClock::at(self.start);
        let alerts = AlertManager::from_config(&self.alert, clock.clone())?;
        let sink = RecordingChannel::new(SINK);
        alerts.add_channel(sink.clone()).await;

        let costs = Arc::new(
            CostTracker::new(backend.storage.clone(), self.pricing)
                .with_clock(clock.clone())
                .with_observer(Arc::new(alerts.clone())),
        );
        let forecaster = Forecaster::new(costs.clone(), self.forecast.clone());
        let budgets = BudgetTracker::new(
            backend.budgets.clone(),
            costs.clone(),
            Forecaster::new(costs.clone(), self.forecast),
            self.budget,
        );

        Ok(TestHarness {
            clock,
            backend,
            costs,
            forecaster,
            budgets,
            alerts,
            sink,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete Spendwise stack for tests.
pub struct TestHarness {
    pub clock: Arc<FixedClock>,
    pub backend: Backend,
    pub costs: Arc<CostTracker>,
    pub forecaster: Forecaster,
    pub budgets: BudgetTracker,
    pub alerts: AlertManager,
    pub sink: Arc<RecordingChannel>,
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Record one call at the current clock reading.
    pub async fn track(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        labels: Labels,
    ) -> Result<UsageEvent, SpendwiseError> {
        self.costs
            .track_call(model, input_tokens, output_tokens, labels)
            .await
    }

    /// Evaluate every active budget's status against the alert rules.
    pub async fn check_budgets(&self) -> Result<Vec<Alert>, SpendwiseError> {
        let mut fired = Vec::new();
        for status in self.budgets.statuses(self.clock.now()).await? {
            fired.extend(self.alerts.evaluate(&Subject::Budget(status)).await);
        }
        Ok(fired)
    }

    /// Run anomaly detection over the configured windows and evaluate
    /// every flagged group against the alert rules.
    pub async fn check_anomalies(&self) -> Result<Vec<Alert>, SpendwiseError> {
        let report = self.costs.detect_recent_anomalies().await?;
        let mut fired = Vec::new();
        for anomaly in report.anomalies {
            fired.extend(self.alerts.evaluate(&Subject::Anomaly(anomaly)).await);
        }
        Ok(fired)
    }
}
