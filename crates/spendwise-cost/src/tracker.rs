// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion and dimensional cost queries.
//!
//! [`CostTracker`] prices each call, writes it through the configured
//! [`StorageBackend`], and serves grouped reports from the same backend.
//! Analytics built on top (anomalies, recommendations, forecasts) only read.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use tracing::{info, warn};

use spendwise_config::SpendwiseConfig;
use spendwise_config::model::{AnomalyConfig, RecommendConfig};
use spendwise_core::types::validate_labels;
use spendwise_core::{
    Clock, Cost, CostQuery, Dimension, Filter, GroupRow, Labels, SpendwiseError, StorageBackend,
    SymbolicRange, SystemClock, TimeRange, UsageEvent, UsageObserver,
};

use crate::pricing::{PricingTable, calculate_cost};
use crate::recording;

/// Result of a grouped cost query.
///
/// `total_cost` is the sum of the row costs, so the rows always partition
/// the total exactly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    pub range: TimeRange,
    pub group_by: Vec<Dimension>,
    pub rows: Vec<GroupRow>,
    pub total_cost: Cost,
    pub total_calls: u64,
}

impl CostReport {
    fn from_rows(range: TimeRange, group_by: Vec<Dimension>, rows: Vec<GroupRow>) -> Self {
        let total_cost = rows.iter().map(|r| r.total_cost).sum();
        let total_calls = rows.iter().map(|r| r.count).sum();
        Self {
            range,
            group_by,
            rows,
            total_cost,
            total_calls,
        }
    }

    /// The row whose key values equal `values`, with `None` for a missing label.
    pub fn row(&self, values: &[Option<&str>]) -> Option<&GroupRow> {
        self.rows.iter().find(|r| {
            r.key.0.len() == values.len()
                && r.key.0.iter().zip(values).all(|(k, v)| k.as_deref() == *v)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Prices, records, and queries LLM usage.
pub struct CostTracker {
    storage: Arc<dyn StorageBackend>,
    pricing: PricingTable,
    clock: Arc<dyn Clock>,
    observers: Vec<Arc<dyn UsageObserver>>,
    pub(crate) anomaly: AnomalyConfig,
    pub(crate) recommend: RecommendConfig,
}

impl CostTracker {
    pub fn new(storage: Arc<dyn StorageBackend>, pricing: PricingTable) -> Self {
        Self {
            storage,
            pricing,
            clock: Arc::new(SystemClock),
            observers: Vec::new(),
            anomaly: AnomalyConfig::default(),
            recommend: RecommendConfig::default(),
        }
    }

    /// Wire a tracker from loaded configuration.
    pub fn from_config(storage: Arc<dyn StorageBackend>, config: &SpendwiseConfig) -> Self {
        Self::new(storage, PricingTable::from_config(&config.pricing))
            .with_anomaly_config(config.anomaly.clone())
            .with_recommend_config(config.recommend.clone())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register an observer notified after every successful write.
    pub fn with_observer(mut self, observer: Arc<dyn UsageObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_anomaly_config(mut self, config: AnomalyConfig) -> Self {
        self.anomaly = config;
        self
    }

    pub fn with_recommend_config(mut self, config: RecommendConfig) -> Self {
        self.recommend = config;
        self
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current time at the precision every backend stores (microseconds).
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(6)
    }

    /// Resolve a symbolic range against the tracker's clock.
    pub fn resolve(&self, range: SymbolicRange) -> TimeRange {
        range.resolve(self.now())
    }

    /// Price and persist one LLM call, returning the stored record.
    pub async fn track_call(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        labels: Labels,
    ) -> Result<UsageEvent, SpendwiseError> {
        validate_labels(&labels)?;
        let resolved = self.pricing.lookup(model)?;
        if resolved.source.is_estimate() {
            warn!(model, source = ?resolved.source, "no exact price, recording an estimate");
        }

        let event = UsageEvent {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: self.now(),
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cost: calculate_cost(&resolved.price, input_tokens, output_tokens),
            labels,
        };
        self.storage.write(&event).await?;

        recording::record_event(&event);
        info!(
            id = %event.id,
            model = %event.model,
            input_tokens,
            output_tokens,
            cost_usd = event.cost.usd(),
            "usage recorded"
        );
        for observer in &self.observers {
            observer.on_event(&event);
        }
        Ok(event)
    }

    /// Aggregate costs in `range`, grouped by `group_by` after applying `filters`.
    pub async fn get_costs(
        &self,
        range: TimeRange,
        group_by: Vec<Dimension>,
        filters: Vec<Filter>,
    ) -> Result<CostReport, SpendwiseError> {
        let query = CostQuery {
            range,
            group_by,
            filters,
        };
        self.report(query).await
    }

    /// Run a prepared query and wrap its rows as a report.
    pub async fn report(&self, query: CostQuery) -> Result<CostReport, SpendwiseError> {
        query.validate()?;
        let rows = self.storage.query(&query).await?;
        Ok(CostReport::from_rows(query.range, query.group_by, rows))
    }

    /// Raw events in `range` matching `filters`, oldest first.
    pub async fn scan(
        &self,
        filters: &[Filter],
        range: &TimeRange,
    ) -> Result<Vec<UsageEvent>, SpendwiseError> {
        spendwise_core::query::validate_filters(filters)?;
        self.storage.scan(filters, range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use spendwise_storage::MemoryStorage;

    struct Collect(Mutex<Vec<String>>);

    impl UsageObserver for Collect {
        fn on_event(&self, event: &UsageEvent) {
            if let Ok(mut seen) = self.0.lock() {
                seen.push(event.id.clone());
            }
        }
    }

    fn tracker() -> CostTracker {
        CostTracker::new(
            Arc::new(MemoryStorage::new()),
            PricingTable::new()
                .with_model("gpt-4", 0.03, 0.06)
                .with_model("gpt-3.5-turbo", 0.0015, 0.002),
        )
    }

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn support_agent_report_row() {
        let tracker = tracker();
        let event = tracker
            .track_call("gpt-4", 1000, 500, labels(&[("agent_id", "support")]))
            .await
            .unwrap();
        assert_eq!(event.cost, Cost::from_usd(0.06));

        let report = tracker
            .get_costs(
                TimeRange::all(),
                vec![Dimension::label("agent_id")],
                Vec::new(),
            )
            .await
            .unwrap();
        let row = report.row(&[Some("support")]).unwrap();
        assert_eq!(row.total_cost, Cost::from_usd(0.06));
        assert_eq!(row.total_tokens, 1500);
        assert_eq!(report.total_cost, Cost::from_usd(0.06));
    }

    #[tokio::test]
    async fn unknown_model_is_rejected_without_writing() {
        let tracker = tracker();
        let err = tracker
            .track_call("gpt-5", 10, 10, Labels::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SpendwiseError::UnknownModel { .. }));
        let report = tracker
            .get_costs(TimeRange::all(), Vec::new(), Vec::new())
            .await
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(report.total_cost, Cost::ZERO);
    }

    #[tokio::test]
    async fn reserved_label_key_is_rejected() {
        let tracker = tracker();
        let err = tracker
            .track_call("gpt-4", 1, 1, labels(&[("model", "x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, SpendwiseError::InvalidLabels(_)));
    }

    #[tokio::test]
    async fn malformed_group_by_fails_before_backend() {
        let tracker = tracker();
        let err = tracker
            .get_costs(
                TimeRange::all(),
                vec![Dimension::label("agent id")],
                Vec::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SpendwiseError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn observers_see_stored_events() {
        let seen = Arc::new(Collect(Mutex::new(Vec::new())));
        let tracker = tracker().with_observer(seen.clone());
        let event = tracker
            .track_call("gpt-3.5-turbo", 100, 100, Labels::new())
            .await
            .unwrap();
        assert_eq!(*seen.0.lock().unwrap(), vec![event.id]);
    }

    #[tokio::test]
    async fn stored_timestamp_has_microsecond_precision() {
        let tracker = tracker();
        let event = tracker
            .track_call("gpt-4", 1, 1, Labels::new())
            .await
            .unwrap();
        assert_eq!(event.timestamp.timestamp_subsec_nanos() % 1000, 0);
    }

    #[tokio::test]
    async fn filters_restrict_report() {
        let tracker = tracker();
        tracker
            .track_call("gpt-4", 1000, 0, labels(&[("team", "search")]))
            .await
            .unwrap();
        tracker
            .track_call("gpt-4", 2000, 0, labels(&[("team", "ads")]))
            .await
            .unwrap();
        let report = tracker
            .get_costs(
                TimeRange::all(),
                vec![Dimension::Model],
                vec![Filter::label("team", "ads")],
            )
            .await
            .unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.total_calls, 1);
        assert_eq!(report.total_cost, Cost::from_usd(0.06));
    }
}
