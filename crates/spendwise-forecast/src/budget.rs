// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget definitions and end-of-period projections.
//!
//! A budget applies to one (period, scope) slot. Definitions are append-only
//! through the [`BudgetStore`]; the newest definition for a slot is the
//! active one. Status compares what has been spent in the current period
//! window with a projected total for the whole window.
//!
//! Projection degrades gracefully:
//! - early in the period (below `min_elapsed_fraction`) nothing is projected
//!   and `projected_total == spent_so_far`;
//! - with enough history the forecast point is prorated over the remaining
//!   fraction of the period;
//! - otherwise the current run rate is extended to the end of the period.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tracing::{debug, info, warn};

use spendwise_config::model::{BudgetConfig, BudgetEntry};
use spendwise_core::query::{scope_key, validate_filters};
use spendwise_core::{
    BudgetDefinition, BudgetStore, Cost, Filter, Period, SlotKey, SpendwiseError, TimeRange,
};
use spendwise_cost::CostTracker;
use spendwise_cost::recording;

use crate::forecast::Forecaster;

/// How `projected_total` was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectionBasis {
    /// Too early in the period to project.
    Suppressed,
    /// Forecast point prorated over the remaining fraction.
    Forecast,
    /// Spend so far extended at the same rate.
    RunRate,
}

/// Expected spend for the rest of the current period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub remainder: Cost,
    pub basis: ProjectionBasis,
}

/// Expected remaining spend given what is known so far.
pub fn project_remainder(
    spent: Cost,
    elapsed: f64,
    min_elapsed: f64,
    forecast_point: Option<Cost>,
) -> Projection {
    if elapsed < min_elapsed || elapsed <= 0.0 {
        return Projection {
            remainder: Cost::ZERO,
            basis: ProjectionBasis::Suppressed,
        };
    }
    let remaining = (1.0 - elapsed).max(0.0);
    match forecast_point {
        Some(point) => Projection {
            remainder: scale(point, remaining),
            basis: ProjectionBasis::Forecast,
        },
        None => Projection {
            remainder: scale(spent, remaining / elapsed),
            basis: ProjectionBasis::RunRate,
        },
    }
}

fn scale(cost: Cost, factor: f64) -> Cost {
    Cost::from_nanos((cost.nanos() as f64 * factor).round() as i64)
}

/// Where a budget stands in its current period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub budget_id: String,
    pub period: Period,
    pub scope: Vec<Filter>,
    /// The full current period.
    pub window: TimeRange,
    pub amount: Cost,
    pub spent_so_far: Cost,
    pub projected_total: Cost,
    pub on_track: bool,
    pub projected_overage: Cost,
    pub elapsed_fraction: f64,
    pub basis: ProjectionBasis,
}

impl BudgetStatus {
    pub fn assemble(
        budget: &BudgetDefinition,
        window: TimeRange,
        elapsed_fraction: f64,
        spent_so_far: Cost,
        projection: Projection,
    ) -> Self {
        let projected_total = spent_so_far + projection.remainder;
        let projected_overage = if projected_total > budget.amount {
            projected_total - budget.amount
        } else {
            Cost::ZERO
        };
        Self {
            budget_id: budget.id.clone(),
            period: budget.period,
            scope: budget.scope.clone(),
            window,
            amount: budget.amount,
            spent_so_far,
            projected_total,
            on_track: projected_total <= budget.amount,
            projected_overage,
            elapsed_fraction,
            basis: projection.basis,
        }
    }

    /// Slot identity, e.g. `monthly|agent_id=support`.
    pub fn slot(&self) -> String {
        format!("{}|{}", self.period, scope_key(&self.scope))
    }

    /// Fraction of the budget already spent.
    pub fn utilization(&self) -> f64 {
        if self.amount.is_zero() {
            return 0.0;
        }
        self.spent_so_far.nanos() as f64 / self.amount.nanos() as f64
    }
}

/// Keeps budget definitions and reports their status.
pub struct BudgetTracker {
    store: Arc<dyn BudgetStore>,
    costs: Arc<CostTracker>,
    forecaster: Forecaster,
    config: BudgetConfig,
}

impl BudgetTracker {
    pub fn new(
        store: Arc<dyn BudgetStore>,
        costs: Arc<CostTracker>,
        forecaster: Forecaster,
        config: BudgetConfig,
    ) -> Self {
        Self {
            store,
            costs,
            forecaster,
            config,
        }
    }

    /// Define the budget for a (period, scope) slot, superseding any earlier one.
    pub async fn set_budget(
        &self,
        amount: Cost,
        period: Period,
        scope: Vec<Filter>,
    ) -> Result<BudgetDefinition, SpendwiseError> {
        if amount <= Cost::ZERO {
            return Err(SpendwiseError::InvalidQuery(format!(
                "budget amount must be positive, got {amount}"
            )));
        }
        validate_filters(&scope)?;

        let mut scope = scope;
        scope.sort();
        let budget = BudgetDefinition {
            id: uuid::Uuid::new_v4().to_string(),
            amount,
            period,
            scope,
            created_at: self.costs.now(),
        };
        self.store.save_budget(&budget).await?;
        info!(slot = %budget.slot(), amount_usd = amount.usd(), "budget set");
        Ok(budget)
    }

    /// Apply configured budgets whose slot has no active definition of the
    /// same amount. Returns how many were written.
    pub async fn apply_config(&self, entries: &[BudgetEntry]) -> Result<usize, SpendwiseError> {
        let active = self.active_budgets().await?;
        let mut written = 0;
        for entry in entries {
            let scope: Vec<Filter> = entry
                .scope
                .iter()
                .map(|(k, v)| -> Result<Filter, SpendwiseError> {
                    Ok(Filter::new(k.parse()?, v.clone()))
                })
                .collect::<Result<_, SpendwiseError>>()?;
            let amount = Cost::from_usd(entry.amount_usd);
            let slot = SlotKey::new(entry.period, &scope);
            let unchanged = active
                .iter()
                .any(|b| b.slot_key() == slot && b.amount == amount);
            if !unchanged {
                self.set_budget(amount, entry.period, scope).await?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// The newest definition per slot, ordered by slot.
    pub async fn active_budgets(&self) -> Result<Vec<BudgetDefinition>, SpendwiseError> {
        let mut latest: BTreeMap<SlotKey, BudgetDefinition> = BTreeMap::new();
        // Oldest first, so later inserts replace earlier ones.
        for budget in self.store.load_budgets().await? {
            latest.insert(budget.slot_key(), budget);
        }
        Ok(latest.into_values().collect())
    }

    /// Status of the active budget for one slot.
    pub async fn get_status(
        &self,
        period: Period,
        scope: &[Filter],
        now: DateTime<Utc>,
    ) -> Result<BudgetStatus, SpendwiseError> {
        let slot = SlotKey::new(period, scope);
        let budget = self
            .active_budgets()
            .await?
            .into_iter()
            .find(|b| b.slot_key() == slot)
            .ok_or_else(|| {
                SpendwiseError::InvalidQuery(format!(
                    "no budget for `{period}|{}`",
                    scope_key(scope)
                ))
            })?;
        self.status_of(&budget, now).await
    }

    /// Status of every active budget, ordered by slot.
    pub async fn statuses(&self, now: DateTime<Utc>) -> Result<Vec<BudgetStatus>, SpendwiseError> {
        let mut out = Vec::new();
        for budget in self.active_budgets().await? {
            out.push(self.status_of(&budget, now).await?);
        }
        Ok(out)
    }

    pub async fn status_of(
        &self,
        budget: &BudgetDefinition,
        now: DateTime<Utc>,
    ) -> Result<BudgetStatus, SpendwiseError> {
        let window = budget.period.window(now);
        let elapsed = budget.period.elapsed_fraction(now);
        let so_far = TimeRange::new(window.start, now)?;
        let spent = self
            .costs
            .get_costs(so_far, Vec::new(), budget.scope.clone())
            .await?
            .total_cost;

        let forecast_point = if elapsed < self.config.min_elapsed_fraction {
            None
        } else {
            match self.forecaster.forecast_at(budget.period, &budget.scope, now).await {
                Ok(forecast) => Some(forecast.point),
                Err(e) if e.is_cold_start() => {
                    debug!(slot = %budget.slot(), error = %e, "no forecast, using run rate");
                    None
                }
                Err(e) => return Err(e),
            }
        };
        let projection =
            project_remainder(spent, elapsed, self.config.min_elapsed_fraction, forecast_point);
        let status = BudgetStatus::assemble(budget, window, elapsed, spent, projection);

        let slot = status.slot();
        recording::set_budget_projected(&slot, status.projected_total.usd());
        if status.utilization() >= self.config.warn_fraction {
            warn!(
                slot = %slot,
                spent_usd = status.spent_so_far.usd(),
                amount_usd = status.amount.usd(),
                "budget threshold reached"
            );
        }
        if !status.on_track {
            warn!(
                slot = %slot,
                projected_usd = status.projected_total.usd(),
                overage_usd = status.projected_overage.usd(),
                basis = %status.basis,
                "budget projected to overrun"
            );
        }
        Ok(status)
    }
}
