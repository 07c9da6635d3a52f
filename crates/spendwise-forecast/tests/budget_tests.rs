// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forecasts and budget statuses over recorded history.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use spendwise_config::model::{BudgetConfig, BudgetEntry, ForecastConfig};
use spendwise_core::{BudgetStore, Clock, Cost, Filter, Labels, Period};
use spendwise_cost::{CostTracker, PricingTable};
use spendwise_forecast::{BudgetTracker, Forecaster, ProjectionBasis, Trend};
use spendwise_storage::MemoryStorage;

struct StepClock(Mutex<DateTime<Utc>>);

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

struct Fixture {
    clock: Arc<StepClock>,
    storage: Arc<MemoryStorage>,
    costs: Arc<CostTracker>,
}

impl Fixture {
    fn new() -> Self {
        let clock = Arc::new(StepClock(Mutex::new(day(2026, 1, 1))));
        let storage = Arc::new(MemoryStorage::new());
        // One dollar per thousand input tokens keeps the arithmetic readable.
        let costs = Arc::new(
            CostTracker::new(storage.clone(), PricingTable::new().with_model("unit", 1.0, 0.0))
                .with_clock(clock.clone()),
        );
        Self {
            clock,
            storage,
            costs,
        }
    }

    async fn spend(&self, at: DateTime<Utc>, usd: u64, team: &str) {
        *self.clock.0.lock().unwrap() = at;
        let mut labels = Labels::new();
        labels.insert("team".into(), team.into());
        self.costs
            .track_call("unit", usd * 1000, 0, labels)
            .await
            .unwrap();
    }

    fn forecaster(&self) -> Forecaster {
        Forecaster::new(self.costs.clone(), ForecastConfig::default())
    }

    fn budgets(&self) -> BudgetTracker {
        let store: Arc<dyn BudgetStore> = self.storage.clone();
        BudgetTracker::new(store, self.costs.clone(), self.forecaster(), BudgetConfig::default())
    }
}

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// $100, $200, $300 in January to March, then $250 early in April.
async fn rising_quarter(f: &Fixture) {
    f.spend(day(2026, 1, 10), 100, "search").await;
    f.spend(day(2026, 2, 10), 200, "search").await;
    f.spend(day(2026, 3, 10), 300, "search").await;
    f.spend(day(2026, 4, 2), 250, "search").await;
}

#[tokio::test]
async fn forecast_follows_linear_history() {
    let f = Fixture::new();
    rising_quarter(&f).await;

    let forecast = f
        .forecaster()
        .forecast_at(Period::Monthly, &[], day(2026, 4, 16))
        .await
        .unwrap();
    assert_eq!(forecast.history.len(), 3);
    assert_eq!(forecast.point, Cost::from_usd(400.0));
    assert_eq!(forecast.trend, Trend::Increasing);
    assert_eq!(forecast.window.start, day(2026, 4, 1));
}

#[tokio::test]
async fn forecast_needs_three_periods() {
    let f = Fixture::new();
    f.spend(day(2026, 2, 10), 200, "search").await;
    f.spend(day(2026, 3, 10), 300, "search").await;

    let err = f
        .forecaster()
        .forecast_at(Period::Monthly, &[], day(2026, 4, 16))
        .await
        .unwrap_err();
    assert!(err.is_cold_start());
}

#[tokio::test]
async fn forecast_respects_scope() {
    let f = Fixture::new();
    rising_quarter(&f).await;
    f.spend(day(2026, 3, 11), 5000, "ads").await;

    let scoped = f
        .forecaster()
        .forecast_at(Period::Monthly, &[Filter::label("team", "search")], day(2026, 4, 16))
        .await
        .unwrap();
    assert_eq!(scoped.point, Cost::from_usd(400.0));
}

#[tokio::test]
async fn status_prorates_forecast() {
    let f = Fixture::new();
    rising_quarter(&f).await;
    let budgets = f.budgets();
    budgets
        .set_budget(Cost::from_usd(600.0), Period::Monthly, vec![])
        .await
        .unwrap();

    // Halfway through April.
    let status = budgets
        .get_status(Period::Monthly, &[], day(2026, 4, 16))
        .await
        .unwrap();
    assert_eq!(status.spent_so_far, Cost::from_usd(250.0));
    assert_eq!(status.basis, ProjectionBasis::Forecast);
    assert_eq!(status.projected_total, Cost::from_usd(450.0));
    assert!(status.on_track);
    assert_eq!(status.projected_overage, Cost::ZERO);
}

#[tokio::test]
async fn status_without_history_uses_run_rate() {
    let f = Fixture::new();
    f.spend(day(2026, 4, 2), 250, "search").await;
    let budgets = f.budgets();
    budgets
        .set_budget(Cost::from_usd(400.0), Period::Monthly, vec![])
        .await
        .unwrap();

    let status = budgets
        .get_status(Period::Monthly, &[], day(2026, 4, 16))
        .await
        .unwrap();
    assert_eq!(status.basis, ProjectionBasis::RunRate);
    assert_eq!(status.projected_total, Cost::from_usd(500.0));
    assert!(!status.on_track);
    assert_eq!(status.projected_overage, Cost::from_usd(100.0));
}

#[tokio::test]
async fn early_in_period_projects_spend_only() {
    let f = Fixture::new();
    rising_quarter(&f).await;
    f.spend(Utc.with_ymd_and_hms(2026, 5, 1, 0, 10, 0).unwrap(), 42, "search")
        .await;
    let budgets = f.budgets();
    budgets
        .set_budget(Cost::from_usd(10.0), Period::Monthly, vec![])
        .await
        .unwrap();

    let now = Utc.with_ymd_and_hms(2026, 5, 1, 1, 0, 0).unwrap();
    let status = budgets.get_status(Period::Monthly, &[], now).await.unwrap();
    assert_eq!(status.basis, ProjectionBasis::Suppressed);
    assert_eq!(status.projected_total, status.spent_so_far);
    assert_eq!(status.spent_so_far, Cost::from_usd(42.0));
}

#[tokio::test]
async fn newer_budget_supersedes_without_rewriting_history() {
    let f = Fixture::new();
    let budgets = f.budgets();
    let scope = vec![Filter::label("team", "search")];
    budgets
        .set_budget(Cost::from_usd(600.0), Period::Monthly, scope.clone())
        .await
        .unwrap();
    *f.clock.0.lock().unwrap() = day(2026, 1, 2);
    budgets
        .set_budget(Cost::from_usd(300.0), Period::Monthly, scope.clone())
        .await
        .unwrap();
    budgets
        .set_budget(Cost::from_usd(50.0), Period::Daily, vec![])
        .await
        .unwrap();

    let active = budgets.active_budgets().await.unwrap();
    assert_eq!(active.len(), 2);
    let monthly = active.iter().find(|b| b.period == Period::Monthly).unwrap();
    assert_eq!(monthly.amount, Cost::from_usd(300.0));
    assert_eq!(f.storage.load_budgets().await.unwrap().len(), 3);

    let statuses = budgets.statuses(day(2026, 1, 20)).await.unwrap();
    assert_eq!(statuses.len(), 2);
}

#[tokio::test]
async fn non_positive_budget_is_rejected() {
    let f = Fixture::new();
    let err = f
        .budgets()
        .set_budget(Cost::ZERO, Period::Weekly, vec![])
        .await;
    assert!(err.is_err());
}

#[tokio::test]
async fn configured_budgets_apply_once() {
    let f = Fixture::new();
    let budgets = f.budgets();
    let entries = vec![BudgetEntry {
        amount_usd: 1000.0,
        period: Period::Monthly,
        scope: [("agent_id".to_string(), "support".to_string())].into(),
    }];
    assert_eq!(budgets.apply_config(&entries).await.unwrap(), 1);
    assert_eq!(budgets.apply_config(&entries).await.unwrap(), 0);
    let status = budgets
        .get_status(
            Period::Monthly,
            &[Filter::label("agent_id", "support")],
            day(2026, 1, 20),
        )
        .await
        .unwrap();
    assert_eq!(status.amount, Cost::from_usd(1000.0));
    assert_eq!(status.slot(), "monthly|agent_id=support");
}

#[tokio::test]
async fn scopes_with_separator_characters_stay_distinct() {
    let f = Fixture::new();
    let budgets = f.budgets();
    let combined = vec![Filter::label("team", "a,x=b")];
    let split = vec![Filter::label("team", "a"), Filter::label("x", "b")];
    budgets
        .set_budget(Cost::from_usd(100.0), Period::Monthly, combined.clone())
        .await
        .unwrap();
    budgets
        .set_budget(Cost::from_usd(200.0), Period::Monthly, split.clone())
        .await
        .unwrap();

    assert_eq!(budgets.active_budgets().await.unwrap().len(), 2);
    let now = day(2026, 1, 20);
    let first = budgets.get_status(Period::Monthly, &combined, now).await.unwrap();
    let second = budgets.get_status(Period::Monthly, &split, now).await.unwrap();
    assert_eq!(first.amount, Cost::from_usd(100.0));
    assert_eq!(second.amount, Cost::from_usd(200.0));
    assert_ne!(first.slot(), second.slot());
}
