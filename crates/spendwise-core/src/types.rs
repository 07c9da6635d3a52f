// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by every Spendwise crate.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::SpendwiseError;
use crate::query::Dimension;

/// Open-ended key/value tags attached to a usage event.
///
/// A `BTreeMap` keeps keys unique and iteration order stable, which makes
/// persisted label sets and rendered scope keys deterministic.
pub type Labels = BTreeMap<String, String>;

/// Label key reserved for the built-in model dimension.
pub const RESERVED_MODEL_KEY: &str = "model";

/// Maximum length of a label key.
pub const MAX_LABEL_KEY_LEN: usize = 64;

/// Maximum length of a label value.
pub const MAX_LABEL_VALUE_LEN: usize = 256;

/// A monetary amount in nano-USD.
///
/// Costs are integers so that totals and grouped partitions sum exactly,
/// independent of aggregation order or backend.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cost(i64);

impl Cost {
    pub const ZERO: Cost = Cost(0);

    /// Nano-USD per USD.
    pub const NANOS_PER_USD: i64 = 1_000_000_000;

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Convert from USD, rounding to the nearest nano-USD.
    pub fn from_usd(usd: f64) -> Self {
        Self((usd * Self::NANOS_PER_USD as f64).round() as i64)
    }

    pub fn usd(self) -> f64 {
        self.0 as f64 / Self::NANOS_PER_USD as f64
    }

    /// Cost of `tokens` at `price_per_1k` USD per thousand tokens.
    ///
    /// Formula: tokens / 1000 * price, rounded once to the nearest nano-USD.
    pub fn for_tokens(tokens: u64, price_per_1k: f64) -> Self {
        let nanos_per_token = price_per_1k * (Self::NANOS_PER_USD as f64 / 1000.0);
        Self((tokens as f64 * nanos_per_token).round() as i64)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost(self.0 + rhs.0)
    }
}

impl AddAssign for Cost {
    fn add_assign(&mut self, rhs: Cost) {
        self.0 += rhs.0;
    }
}

impl Sub for Cost {
    type Output = Cost;

    fn sub(self, rhs: Cost) -> Cost {
        Cost(self.0 - rhs.0)
    }
}

impl Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Cost {
        iter.fold(Cost::ZERO, |acc, c| acc + c)
    }
}

impl<'a> Sum<&'a Cost> for Cost {
    fn sum<I: Iterator<Item = &'a Cost>>(iter: I) -> Cost {
        iter.copied().sum()
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.6}", self.usd())
    }
}

/// A single recorded LLM call. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Unique record identifier (UUID v4).
    pub id: String,
    /// When the call was recorded.
    pub timestamp: DateTime<Utc>,
    /// Model identifier used for pricing.
    pub model: String,
    /// Number of input (prompt) tokens.
    pub input_tokens: u64,
    /// Number of output (completion) tokens.
    pub output_tokens: u64,
    /// Cost computed at ingestion time.
    pub cost: Cost,
    /// Dimensional tags (agent, team, feature, ...).
    pub labels: Labels,
}

impl UsageEvent {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Value of the given dimension for this event, if present.
    pub fn dimension_value(&self, dimension: &Dimension) -> Option<&str> {
        match dimension {
            Dimension::Model => Some(self.model.as_str()),
            Dimension::Label(key) => self.labels.get(key).map(String::as_str),
        }
    }
}

/// Validate a single label key.
///
/// Keys are non-empty, at most 64 characters, and use `[A-Za-z0-9_.-]`.
pub fn validate_label_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("label key must not be empty".to_string());
    }
    if key.len() > MAX_LABEL_KEY_LEN {
        return Err(format!(
            "label key `{key}` exceeds {MAX_LABEL_KEY_LEN} characters"
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        return Err(format!(
            "label key `{key}` may only contain ASCII letters, digits, '_', '.', '-'"
        ));
    }
    Ok(())
}

/// Validate an event's label set before it is written.
pub fn validate_labels(labels: &Labels) -> Result<(), SpendwiseError> {
    for (key, value) in labels {
        validate_label_key(key).map_err(SpendwiseError::InvalidLabels)?;
        if key == RESERVED_MODEL_KEY {
            return Err(SpendwiseError::InvalidLabels(format!(
                "label key `{RESERVED_MODEL_KEY}` is reserved for the model dimension"
            )));
        }
        if value.len() > MAX_LABEL_VALUE_LEN {
            return Err(SpendwiseError::InvalidLabels(format!(
                "value for label `{key}` exceeds {MAX_LABEL_VALUE_LEN} characters"
            )));
        }
    }
    Ok(())
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Channel,
}

/// Alert severity, ordered from least to most urgent.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_for_tokens_matches_per_thousand_formula() {
        // 1000 tokens at $0.03/1k + 500 tokens at $0.06/1k = $0.06
        let cost = Cost::for_tokens(1000, 0.03) + Cost::for_tokens(500, 0.06);
        assert_eq!(cost, Cost::from_usd(0.06));
        assert_eq!(cost.nanos(), 60_000_000);
    }

    #[test]
    fn cost_sum_and_display() {
        let costs = [Cost::from_usd(1.5), Cost::from_usd(0.25), Cost::ZERO];
        let total: Cost = costs.iter().sum();
        assert_eq!(total, Cost::from_usd(1.75));
        assert_eq!(total.to_string(), "$1.750000");
    }

    #[test]
    fn severity_orders_by_urgency() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
    }

    #[test]
    fn label_key_rules() {
        assert!(validate_label_key("agent_id").is_ok());
        assert!(validate_label_key("team.name-v2").is_ok());
        assert!(validate_label_key("").is_err());
        assert!(validate_label_key("has space").is_err());
        assert!(validate_label_key(&"k".repeat(65)).is_err());
    }

    #[test]
    fn reserved_model_label_rejected() {
        let mut labels = Labels::new();
        labels.insert("model".into(), "gpt-4".into());
        let err = validate_labels(&labels).unwrap_err();
        assert!(matches!(err, SpendwiseError::InvalidLabels(_)));
    }

    #[test]
    fn dimension_value_reads_model_and_labels() {
        let mut labels = Labels::new();
        labels.insert("agent_id".into(), "support".into());
        let event = UsageEvent {
            id: "e1".into(),
            timestamp: Utc::now(),
            model: "gpt-4".into(),
            input_tokens: 10,
            output_tokens: 5,
            cost: Cost::ZERO,
            labels,
        };
        assert_eq!(event.dimension_value(&Dimension::Model), Some("gpt-4"));
        assert_eq!(
            event.dimension_value(&Dimension::Label("agent_id".into())),
            Some("support")
        );
        assert_eq!(event.dimension_value(&Dimension::Label("team".into())), None);
        assert_eq!(event.total_tokens(), 15);
    }
}
