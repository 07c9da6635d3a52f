// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost tracker behaviour against real backends.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use spendwise_core::{Clock, Cost, Dimension, Labels, StorageBackend, TimeRange};
use spendwise_cost::{CostTracker, PricingTable};
use spendwise_storage::{MemoryStorage, SqliteStorage};

struct StepClock(Mutex<DateTime<Utc>>);

impl StepClock {
    fn at(ts: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(ts)))
    }

    fn set(&self, ts: DateTime<Utc>) {
        *self.0.lock().unwrap() = ts;
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap()
}

fn pricing() -> PricingTable {
    PricingTable::new()
        .with_model("gpt-4", 0.03, 0.06)
        .with_model("gpt-3.5-turbo", 0.0015, 0.002)
        .with_model("claude-3-haiku", 0.00025, 0.00125)
}

fn agent(id: &str) -> Labels {
    let mut labels = Labels::new();
    labels.insert("agent_id".into(), id.into());
    labels
}

#[tokio::test]
async fn sqlite_report_groups_by_agent() {
    let storage: Arc<dyn StorageBackend> = Arc::new(SqliteStorage::open_in_memory().await.unwrap());
    let tracker = CostTracker::new(storage, pricing());
    tracker
        .track_call("gpt-4", 1000, 500, agent("support"))
        .await
        .unwrap();

    let report = tracker
        .get_costs(TimeRange::all(), vec![Dimension::label("agent_id")], vec![])
        .await
        .unwrap();
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].key.value(0), Some("support"));
    assert_eq!(report.rows[0].total_cost, Cost::from_usd(0.06));
}

#[tokio::test]
async fn detects_spike_against_stored_baseline() {
    let clock = StepClock::at(t0() - TimeDelta::days(7));
    let tracker = CostTracker::new(Arc::new(MemoryStorage::new()), pricing())
        .with_clock(clock.clone());

    // Steady baseline: two small calls a day for a week.
    for day in 0..7 {
        for hour in [9, 15] {
            clock.set(t0() - TimeDelta::days(7 - day) + TimeDelta::hours(hour));
            tracker
                .track_call("gpt-4", 1000, 0, agent("support"))
                .await
                .unwrap();
        }
    }
    // Today: ten of the same calls.
    for minute in 0..10 {
        clock.set(t0() + TimeDelta::hours(10) + TimeDelta::minutes(minute));
        tracker
            .track_call("gpt-4", 1000, 0, agent("support"))
            .await
            .unwrap();
    }

    let window = TimeRange::new(t0(), t0() + TimeDelta::days(1)).unwrap();
    let baseline = TimeRange::new(t0() - TimeDelta::days(7), t0()).unwrap();
    let report = tracker
        .detect_anomalies(window, baseline, 2.0)
        .await
        .unwrap();
    assert_eq!(report.anomalies.len(), 1);
    assert!((report.anomalies[0].deviation_ratio - 5.0).abs() < 1e-9);
    assert_eq!(report.anomalies[0].baseline_average, Cost::from_usd(0.06));
}

#[tokio::test]
async fn first_nonzero_spend_after_silence_is_not_anomalous() {
    let clock = StepClock::at(t0() + TimeDelta::hours(1));
    let tracker = CostTracker::new(Arc::new(MemoryStorage::new()), pricing())
        .with_clock(clock.clone());
    tracker
        .track_call("gpt-4", 100_000, 0, agent("support"))
        .await
        .unwrap();

    let window = TimeRange::new(t0(), t0() + TimeDelta::days(1)).unwrap();
    let baseline = TimeRange::new(t0() - TimeDelta::days(7), t0()).unwrap();
    let report = tracker
        .detect_anomalies(window, baseline, 2.0)
        .await
        .unwrap();
    assert!(report.anomalies.is_empty());
    assert_eq!(report.insufficient.len(), 1);
}

#[tokio::test]
async fn recommend_suggests_cheaper_model() {
    let clock = StepClock::at(t0());
    let tracker = CostTracker::new(Arc::new(MemoryStorage::new()), pricing())
        .with_clock(clock.clone());
    for i in 0..20 {
        clock.set(t0() - TimeDelta::hours(i));
        tracker
            .track_call("gpt-4", 1000, 500, agent("support"))
            .await
            .unwrap();
        tracker
            .track_call("claude-3-haiku", 1000, 500, agent("support"))
            .await
            .unwrap();
    }
    clock.set(t0());

    let recs = tracker.recommend().await.unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].from, "gpt-4");
    assert_eq!(recs[0].to, "claude-3-haiku");
    assert!(recs[0].estimated_savings > Cost::from_usd(1.0));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The full-range total equals the sum of every stored event's cost, and
    /// every grouping partitions it exactly.
    #[test]
    fn totals_partition_exactly(calls in prop::collection::vec(
        (0usize..3, 0u64..50_000, 0u64..20_000, prop::option::of(0u8..4)),
        1..40,
    )) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let tracker = CostTracker::new(Arc::new(MemoryStorage::new()), pricing());
            let models = ["gpt-4", "gpt-3.5-turbo", "claude-3-haiku"];
            let mut expected = Cost::ZERO;
            for (model, input, output, team) in &calls {
                let mut labels = Labels::new();
                if let Some(team) = team {
                    labels.insert("team".into(), format!("t{team}"));
                }
                let event = tracker
                    .track_call(models[*model], *input, *output, labels)
                    .await
                    .unwrap();
                expected += event.cost;
            }

            let total = tracker.get_costs(TimeRange::all(), vec![], vec![]).await.unwrap();
            prop_assert_eq!(total.total_cost, expected);
            for group_by in [
                vec![Dimension::Model],
                vec![Dimension::label("team")],
                vec![Dimension::label("team"), Dimension::Model],
            ] {
                let grouped = tracker.get_costs(TimeRange::all(), group_by, vec![]).await.unwrap();
                prop_assert_eq!(grouped.total_cost, total.total_cost);
                prop_assert_eq!(grouped.total_calls, calls.len() as u64);
            }
            Ok(())
        })?;
    }
}
