// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage backend trait for usage records.

use async_trait::async_trait;

use crate::error::SpendwiseError;
use crate::query::{CostQuery, Filter, GroupRow};
use crate::time::TimeRange;
use crate::traits::adapter::Adapter;
use crate::types::UsageEvent;

/// Persistence for usage records.
///
/// Contract every implementation upholds:
/// - `write` is atomic per event: readers see all of it or none of it.
/// - `query` aggregates over a single point-in-time snapshot, so the rows of
///   one result never straddle a concurrent write.
/// - `query` returns one row per distinct group key present after filtering,
///   ordered by key ascending with missing values first.
/// - `scan` returns raw events in ascending timestamp order (ties by id).
///
/// Queries arrive pre-validated; implementations may still call
/// [`CostQuery::validate`] but must never see a malformed key from callers
/// that go through the cost tracker.
#[async_trait]
pub trait StorageBackend: Adapter {
    /// Persist one event.
    async fn write(&self, event: &UsageEvent) -> Result<(), SpendwiseError>;

    /// Filtered, grouped aggregation.
    async fn query(&self, query: &CostQuery) -> Result<Vec<GroupRow>, SpendwiseError>;

    /// Time-ordered raw events matching `filters` inside `range`.
    async fn scan(
        &self,
        filters: &[Filter],
        range: &TimeRange,
    ) -> Result<Vec<UsageEvent>, SpendwiseError>;
}
