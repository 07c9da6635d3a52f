// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-lifetime backend holding events in a sorted `Vec`.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use spendwise_core::query::{matches_all, validate_filters};
use spendwise_core::{
    Adapter, AdapterType, BudgetDefinition, BudgetStore, Cost, CostQuery, Filter, GroupKey,
    GroupRow, HealthStatus, SpendwiseError, StorageBackend, TimeRange, UsageEvent,
};

const BACKEND: &str = "memory";

/// In-memory storage. Data is lost when the value is dropped.
///
/// Events are kept sorted by `(timestamp, id)`. A write holds the write lock
/// for one insertion and a query holds the read lock for its whole pass, which
/// gives each query a point-in-time view.
#[derive(Default)]
pub struct MemoryStorage {
    events: RwLock<EventLog>,
    budgets: RwLock<Vec<BudgetDefinition>>,
}

#[derive(Default)]
struct EventLog {
    sorted: Vec<UsageEvent>,
    ids: HashSet<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.events.read().await.sorted.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.sorted.is_empty()
    }
}

#[async_trait]
impl Adapter for MemoryStorage {
    fn name(&self) -> &str {
        BACKEND
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, SpendwiseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SpendwiseError> {
        let events = self.len().await;
        debug!(events, "memory storage shut down");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn write(&self, event: &UsageEvent) -> Result<(), SpendwiseError> {
        let mut log = self.events.write().await;
        if !log.ids.insert(event.id.clone()) {
            return Err(SpendwiseError::Storage {
                source: format!("duplicate event id `{}`", event.id).into(),
            });
        }
        let at = log
            .sorted
            .partition_point(|e| (e.timestamp, &e.id) <= (event.timestamp, &event.id));
        log.sorted.insert(at, event.clone());
        Ok(())
    }

    async fn query(&self, query: &CostQuery) -> Result<Vec<GroupRow>, SpendwiseError> {
        query.validate()?;
        let log = self.events.read().await;

        let mut groups: BTreeMap<GroupKey, GroupRow> = BTreeMap::new();
        for event in in_range(&log.sorted, &query.range) {
            if !matches_all(&query.filters, event) {
                continue;
            }
            let key = GroupKey::of(event, &query.group_by);
            let row = groups.entry(key.clone()).or_insert_with(|| GroupRow {
                key,
                count: 0,
                total_cost: Cost::ZERO,
                total_tokens: 0,
            });
            row.count += 1;
            row.total_cost += event.cost;
            row.total_tokens += event.total_tokens();
        }
        Ok(groups.into_values().collect())
    }

    async fn scan(
        &self,
        filters: &[Filter],
        range: &TimeRange,
    ) -> Result<Vec<UsageEvent>, SpendwiseError> {
        validate_filters(filters)?;
        let log = self.events.read().await;
        Ok(in_range(&log.sorted, range)
            .filter(|e| matches_all(filters, e))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BudgetStore for MemoryStorage {
    async fn save_budget(&self, budget: &BudgetDefinition) -> Result<(), SpendwiseError> {
        self.budgets.write().await.push(budget.clone());
        Ok(())
    }

    async fn load_budgets(&self) -> Result<Vec<BudgetDefinition>, SpendwiseError> {
        let mut budgets = self.budgets.read().await.clone();
        // Stable: equal timestamps keep insertion order.
        budgets.sort_by_key(|b| b.created_at);
        Ok(budgets)
    }
}

/// The contiguous slice of `events` whose timestamps fall in `range`.
fn in_range<'a>(
    events: &'a [UsageEvent],
    range: &TimeRange,
) -> impl Iterator<Item = &'a UsageEvent> {
    let start = events.partition_point(|e| e.timestamp < range.start);
    let end = events.partition_point(|e| e.timestamp < range.end);
    events[start..end.max(start)].iter()
}
