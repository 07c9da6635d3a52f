// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert rules and the subjects they are evaluated against.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use spendwise_core::query::matches_all;
use spendwise_core::{Cost, Dimension, Filter, GroupKey, Severity, UsageEvent};
use spendwise_cost::Anomaly;
use spendwise_forecast::BudgetStatus;

/// Dimension name to value for one alert scope. `None` marks an event that
/// lacks the label.
pub type ScopeValues = BTreeMap<String, Option<String>>;

/// Something a rule can fire on.
#[derive(Debug, Clone)]
pub enum Subject {
    /// A freshly recorded usage event.
    Event(UsageEvent),
    /// A budget's current status.
    Budget(BudgetStatus),
    /// A detected cost anomaly.
    Anomaly(Anomaly),
}

impl Subject {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => "event",
            Self::Budget(_) => "budget",
            Self::Anomaly(_) => "anomaly",
        }
    }

    /// Cooldown scope for this subject. Events are scoped by the rule's
    /// `scope_by` dimensions; budgets by slot; anomalies by group key.
    pub fn scope(&self, scope_by: &[Dimension]) -> String {
        match self {
            Self::Event(event) => GroupKey::of(event, scope_by).render(scope_by),
            Self::Budget(status) => status.slot(),
            Self::Anomaly(anomaly) => anomaly.scope(),
        }
    }

    /// The same scope as [`scope`](Self::scope), keyed by dimension name.
    pub fn scope_values(&self, scope_by: &[Dimension]) -> ScopeValues {
        match self {
            Self::Event(event) => zip_key(scope_by, &GroupKey::of(event, scope_by)),
            Self::Budget(status) => status
                .scope
                .iter()
                .map(|f| (f.dimension.name().to_string(), Some(f.value.clone())))
                .collect(),
            Self::Anomaly(anomaly) => zip_key(&anomaly.group_by, &anomaly.key),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Event(event) => format!(
                "{} call cost {} ({} tokens)",
                event.model,
                event.cost,
                event.total_tokens()
            ),
            Self::Budget(status) => format!(
                "budget {} spent {} of {}, projected {} (overage {})",
                status.slot(),
                status.spent_so_far,
                status.amount,
                status.projected_total,
                status.projected_overage
            ),
            Self::Anomaly(anomaly) => format!(
                "{} cost {} is {:.2}x its baseline {}",
                anomaly.scope(),
                anomaly.observed,
                anomaly.deviation_ratio,
                anomaly.baseline_average
            ),
        }
    }
}

fn zip_key(dimensions: &[Dimension], key: &GroupKey) -> ScopeValues {
    dimensions
        .iter()
        .zip(&key.0)
        .map(|(d, v)| (d.name().to_string(), v.clone()))
        .collect()
}

/// Condition under which a rule fires.
#[derive(Clone)]
pub enum RulePredicate {
    /// A single event costs more than the amount.
    EventCostAbove(Cost),
    /// A budget is projected to exceed its amount.
    BudgetOverrun,
    /// A budget has spent at least this fraction of its amount.
    BudgetUtilization(f64),
    /// An anomaly deviates from its baseline by at least this ratio.
    AnomalyRatioAtLeast(f64),
    Custom(Arc<dyn Fn(&Subject) -> bool + Send + Sync>),
}

impl RulePredicate {
    pub fn custom(f: impl Fn(&Subject) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn holds(&self, subject: &Subject) -> bool {
        match (self, subject) {
            (Self::EventCostAbove(limit), Subject::Event(event)) => event.cost > *limit,
            (Self::BudgetOverrun, Subject::Budget(status)) => !status.on_track,
            (Self::BudgetUtilization(fraction), Subject::Budget(status)) => {
                status.utilization() >= *fraction
            }
            (Self::AnomalyRatioAtLeast(ratio), Subject::Anomaly(anomaly)) => {
                anomaly.deviation_ratio >= *ratio
            }
            (Self::Custom(f), subject) => f(subject),
            _ => false,
        }
    }
}

impl fmt::Debug for RulePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventCostAbove(c) => f.debug_tuple("EventCostAbove").field(c).finish(),
            Self::BudgetOverrun => f.write_str("BudgetOverrun"),
            Self::BudgetUtilization(x) => f.debug_tuple("BudgetUtilization").field(x).finish(),
            Self::AnomalyRatioAtLeast(x) => f.debug_tuple("AnomalyRatioAtLeast").field(x).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A named predicate with severity, target channels, and cooldown.
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub id: String,
    pub predicate: RulePredicate,
    pub severity: Severity,
    /// Channel names; empty means every registered channel.
    pub channels: Vec<String>,
    /// Falls back to the manager's default when `None`.
    pub cooldown: Option<TimeDelta>,
    /// Dimensions that split event subjects into independent cooldown scopes.
    pub scope_by: Vec<Dimension>,
    /// Event subjects must match all of these.
    pub filters: Vec<Filter>,
}

impl AlertRule {
    pub fn new(id: impl Into<String>, predicate: RulePredicate, severity: Severity) -> Self {
        Self {
            id: id.into(),
            predicate,
            severity,
            channels: Vec::new(),
            cooldown: None,
            scope_by: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn channels<S: Into<String>>(mut self, channels: impl IntoIterator<Item = S>) -> Self {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn cooldown(mut self, cooldown: TimeDelta) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn scope_by(mut self, dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        self.scope_by = dimensions.into_iter().collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Whether the rule fires for `subject`, ignoring cooldown.
    pub fn matches(&self, subject: &Subject) -> bool {
        if let Subject::Event(event) = subject {
            if !matches_all(&self.filters, event) {
                return false;
            }
        }
        self.predicate.holds(subject)
    }
}

/// One firing of a rule for one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub rule_id: String,
    pub severity: Severity,
    /// Rendered scope, also the cooldown key.
    pub scope: String,
    pub scope_values: ScopeValues,
    pub subject: &'static str,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}
