// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for budget definitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SpendwiseError;
use crate::query::{Filter, canonical_scope, scope_key};
use crate::time::Period;
use crate::types::Cost;

/// One version of a budget for a (period, scope) pair.
///
/// Definitions are append-only: setting a new budget for the same scope adds
/// a newer row, and the newest row per scope is the active one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetDefinition {
    pub id: String,
    pub amount: Cost,
    pub period: Period,
    /// Conjunctive filters selecting which events count against the budget.
    pub scope: Vec<Filter>,
    pub created_at: DateTime<Utc>,
}

impl BudgetDefinition {
    /// Identity of the slot this definition occupies, e.g. `monthly|agent_id=support`.
    pub fn slot(&self) -> String {
        format!("{}|{}", self.period, scope_key(&self.scope))
    }

    /// Structured slot identity: the period and the scope in canonical order.
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.period, &self.scope)
    }
}

/// What a budget definition supersedes: same period, same set of filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub period: Period,
    pub scope: Vec<Filter>,
}

impl SlotKey {
    pub fn new(period: Period, scope: &[Filter]) -> Self {
        Self {
            period,
            scope: canonical_scope(scope),
        }
    }
}

/// Append-only store of budget definitions.
#[async_trait]
pub trait BudgetStore: Send + Sync + 'static {
    /// Append a definition. Never overwrites earlier versions.
    async fn save_budget(&self, budget: &BudgetDefinition) -> Result<(), SpendwiseError>;

    /// Every stored definition, oldest first.
    async fn load_budgets(&self) -> Result<Vec<BudgetDefinition>, SpendwiseError>;
}
