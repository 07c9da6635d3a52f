// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Advisory migration suggestions.
//!
//! Options are the values of one compared dimension (usually `model`) inside
//! a shared context (the `within` dimensions, e.g. the same `agent_id`). When
//! two options have comparable call volumes and one costs more per call than
//! the other by more than the savings threshold, the expensive one gets a
//! suggestion pointing at the cheapest comparable alternative.

use std::collections::BTreeMap;

use chrono::TimeDelta;
use serde::Serialize;
use tracing::debug;

use spendwise_config::model::RecommendConfig;
use spendwise_core::{Cost, CostQuery, Dimension, GroupKey, GroupRow, SpendwiseError, TimeRange};

use crate::tracker::CostTracker;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// Values of the `within` dimensions shared by both options.
    pub context: GroupKey,
    pub within: Vec<Dimension>,
    pub dimension: Dimension,
    pub from: String,
    pub to: String,
    pub from_calls: u64,
    pub to_calls: u64,
    pub from_avg_cost: Cost,
    pub to_avg_cost: Cost,
    /// `(from_avg - to_avg) / to_avg`.
    pub relative_difference: f64,
    /// What `from`'s calls would have saved at `to`'s average price.
    pub estimated_savings: Cost,
}

impl Recommendation {
    pub fn context_label(&self) -> String {
        self.context.render(&self.within)
    }
}

/// Thresholds for one recommendation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendParams {
    pub dimension: Dimension,
    pub within: Vec<Dimension>,
    pub savings_threshold: f64,
    pub min_volume_ratio: f64,
    pub min_calls: u64,
}

impl RecommendParams {
    pub fn from_config(config: &RecommendConfig) -> Result<Self, SpendwiseError> {
        Ok(Self {
            dimension: config.compare.parse()?,
            within: config
                .within
                .iter()
                .map(|d| d.parse::<Dimension>())
                .collect::<Result<Vec<_>, _>>()?,
            savings_threshold: config.savings_threshold,
            min_volume_ratio: config.min_volume_ratio,
            min_calls: config.min_calls,
        })
    }

    fn group_by(&self) -> Vec<Dimension> {
        let mut dims = self.within.clone();
        dims.push(self.dimension.clone());
        dims
    }
}

struct Candidate<'a> {
    value: &'a str,
    row: &'a GroupRow,
    avg_nanos: f64,
}

/// Build suggestions from rows grouped by `within ++ [dimension]`.
pub fn recommendations(rows: &[GroupRow], params: &RecommendParams) -> Vec<Recommendation> {
    let split = params.within.len();
    let mut contexts: BTreeMap<GroupKey, Vec<Candidate<'_>>> = BTreeMap::new();
    for row in rows {
        if row.count < params.min_calls || row.count == 0 {
            continue;
        }
        // Events without the compared dimension are not an option.
        let Some(value) = row.key.value(split) else {
            continue;
        };
        let context = GroupKey(row.key.0[..split].to_vec());
        contexts.entry(context).or_default().push(Candidate {
            value,
            row,
            avg_nanos: row.total_cost.nanos() as f64 / row.count as f64,
        });
    }

    let mut out = Vec::new();
    for (context, options) in &contexts {
        for from in options {
            let best = options
                .iter()
                .filter(|to| to.value != from.value && to.avg_nanos > 0.0)
                .filter(|to| volume_ratio(from.row.count, to.row.count) >= params.min_volume_ratio)
                .filter(|to| (from.avg_nanos - to.avg_nanos) / to.avg_nanos > params.savings_threshold)
                .min_by(|a, b| {
                    a.avg_nanos
                        .total_cmp(&b.avg_nanos)
                        .then_with(|| a.value.cmp(b.value))
                });
            let Some(to) = best else {
                continue;
            };
            let diff = from.avg_nanos - to.avg_nanos;
            out.push(Recommendation {
                context: context.clone(),
                within: params.within.clone(),
                dimension: params.dimension.clone(),
                from: from.value.to_string(),
                to: to.value.to_string(),
                from_calls: from.row.count,
                to_calls: to.row.count,
                from_avg_cost: Cost::from_nanos(from.avg_nanos.round() as i64),
                to_avg_cost: Cost::from_nanos(to.avg_nanos.round() as i64),
                relative_difference: diff / to.avg_nanos,
                estimated_savings: Cost::from_nanos((diff * from.row.count as f64).round() as i64),
            });
        }
    }
    out.sort_by(|a, b| {
        b.estimated_savings
            .cmp(&a.estimated_savings)
            .then_with(|| a.context.cmp(&b.context))
            .then_with(|| a.from.cmp(&b.from))
    });
    out
}

fn volume_ratio(a: u64, b: u64) -> f64 {
    let (small, large) = if a <= b { (a, b) } else { (b, a) };
    if large == 0 {
        return 0.0;
    }
    small as f64 / large as f64
}

impl CostTracker {
    /// Suggestions over the configured look-back window. Read-only.
    pub async fn recommend(&self) -> Result<Vec<Recommendation>, SpendwiseError> {
        let params = RecommendParams::from_config(&self.recommend)?;
        let range = TimeRange::trailing(
            self.now(),
            TimeDelta::days(i64::from(self.recommend.lookback_days)),
        );
        self.recommend_in(range, &params).await
    }

    pub async fn recommend_in(
        &self,
        range: TimeRange,
        params: &RecommendParams,
    ) -> Result<Vec<Recommendation>, SpendwiseError> {
        let report = self
            .report(CostQuery::new(range).group_by(params.group_by()))
            .await?;
        let suggestions = recommendations(&report.rows, params);
        debug!(
            options = report.rows.len(),
            suggestions = suggestions.len(),
            "recommendations computed"
        );
        Ok(suggestions)
    }
}
