// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dimensional query model: dimensions, filters, group keys, and aggregated rows.
//!
//! A [`CostQuery`] is validated here, before any backend sees it, so every
//! backend can assume well-formed label keys and a non-inverted time range.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpendwiseError;
use crate::time::TimeRange;
use crate::types::{validate_label_key, Cost, UsageEvent, RESERVED_MODEL_KEY};

/// Maximum number of dimensions in a single `group_by`.
pub const MAX_GROUP_DIMENSIONS: usize = 8;

/// A dimension events can be filtered or grouped on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Dimension {
    /// The event's model identifier.
    Model,
    /// An arbitrary label key.
    Label(String),
}

impl Dimension {
    pub fn label(key: impl Into<String>) -> Self {
        Self::Label(key.into())
    }

    /// Column/key name used in rendered output.
    pub fn name(&self) -> &str {
        match self {
            Self::Model => RESERVED_MODEL_KEY,
            Self::Label(key) => key,
        }
    }
}

impl FromStr for Dimension {
    type Err = SpendwiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == RESERVED_MODEL_KEY {
            return Ok(Self::Model);
        }
        validate_label_key(s).map_err(SpendwiseError::InvalidQuery)?;
        Ok(Self::Label(s.to_string()))
    }
}

impl TryFrom<String> for Dimension {
    type Error = SpendwiseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dimension> for String {
    fn from(value: Dimension) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Equality filter on one dimension. Filters in a query are conjunctive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Filter {
    pub dimension: Dimension,
    pub value: String,
}

impl Filter {
    pub fn new(dimension: Dimension, value: impl Into<String>) -> Self {
        Self {
            dimension,
            value: value.into(),
        }
    }

    /// Shorthand for a label equality filter.
    pub fn label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Dimension::Label(key.into()), value)
    }

    pub fn matches(&self, event: &UsageEvent) -> bool {
        event.dimension_value(&self.dimension) == Some(self.value.as_str())
    }
}

/// Whether an event satisfies every filter.
pub fn matches_all(filters: &[Filter], event: &UsageEvent) -> bool {
    filters.iter().all(|f| f.matches(event))
}

/// Rendering of an absent group value.
pub const MISSING_VALUE: &str = "-";

/// Escape a value for use inside a rendered key.
///
/// Dimension names never contain `\`, `,`, `=` or `|`, so escaping those in
/// values (and a literal `-`, which would read as [`MISSING_VALUE`]) keeps
/// distinct keys distinct.
pub fn escape_value(value: &str) -> String {
    if value == MISSING_VALUE {
        return format!("\\{MISSING_VALUE}");
    }
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',' | '=' | '|') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Canonical rendering of a filter set, e.g. `agent_id=support,model=gpt-4`.
///
/// Filters are sorted first so equal scopes always render identically, and
/// values are escaped so unequal scopes never do. The empty scope renders
/// as `*`.
pub fn scope_key(filters: &[Filter]) -> String {
    if filters.is_empty() {
        return "*".to_string();
    }
    canonical_scope(filters)
        .iter()
        .map(|f| format!("{}={}", f.dimension, escape_value(&f.value)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Filters in canonical (sorted) order.
pub fn canonical_scope(filters: &[Filter]) -> Vec<Filter> {
    let mut sorted = filters.to_vec();
    sorted.sort();
    sorted
}

/// Validate a filter list: well-formed keys and no dimension repeated.
pub fn validate_filters(filters: &[Filter]) -> Result<(), SpendwiseError> {
    let mut seen = HashSet::new();
    for filter in filters {
        if let Dimension::Label(key) = &filter.dimension {
            validate_label_key(key).map_err(SpendwiseError::InvalidQuery)?;
        }
        if !seen.insert(&filter.dimension) {
            return Err(SpendwiseError::InvalidQuery(format!(
                "dimension `{}` filtered more than once",
                filter.dimension
            )));
        }
    }
    Ok(())
}

/// The values of the group-by dimensions for one aggregated row.
///
/// `None` marks events that do not carry the grouped label, so those events
/// still land in exactly one row and the partition stays complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey(pub Vec<Option<String>>);

impl GroupKey {
    pub fn of(event: &UsageEvent, group_by: &[Dimension]) -> Self {
        Self(
            group_by
                .iter()
                .map(|d| event.dimension_value(d).map(str::to_string))
                .collect(),
        )
    }

    /// Render against its dimensions, e.g. `agent_id=support,model=gpt-4`.
    pub fn render(&self, group_by: &[Dimension]) -> String {
        if self.0.is_empty() {
            return "*".to_string();
        }
        group_by
            .iter()
            .zip(&self.0)
            .map(|(d, v)| match v {
                Some(v) => format!("{d}={}", escape_value(v)),
                None => format!("{d}={MISSING_VALUE}"),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn value(&self, index: usize) -> Option<&str> {
        self.0.get(index).and_then(|v| v.as_deref())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self
            .0
            .iter()
            .map(|v| v.as_deref().unwrap_or(MISSING_VALUE))
            .collect();
        f.write_str(&parts.join("/"))
    }
}

/// One aggregated row of a grouped query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRow {
    pub key: GroupKey,
    /// Number of events in the group.
    pub count: u64,
    pub total_cost: Cost,
    /// Input plus output tokens.
    pub total_tokens: u64,
}

impl GroupRow {
    /// Average cost per call in USD.
    pub fn avg_cost_usd(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_cost.usd() / self.count as f64
        }
    }
}

/// A filtered, grouped aggregation over a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostQuery {
    pub range: TimeRange,
    #[serde(default)]
    pub group_by: Vec<Dimension>,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl CostQuery {
    pub fn new(range: TimeRange) -> Self {
        Self {
            range,
            group_by: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn group_by(mut self, dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        self.group_by.extend(dimensions);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Reject malformed queries before they reach a backend.
    pub fn validate(&self) -> Result<(), SpendwiseError> {
        if self.range.end < self.range.start {
            return Err(SpendwiseError::InvalidQuery(format!(
                "time range end {} precedes start {}",
                self.range.end, self.range.start
            )));
        }
        if self.group_by.len() > MAX_GROUP_DIMENSIONS {
            return Err(SpendwiseError::InvalidQuery(format!(
                "group_by has {} dimensions, maximum is {MAX_GROUP_DIMENSIONS}",
                self.group_by.len()
            )));
        }
        let mut seen = HashSet::new();
        for dimension in &self.group_by {
            if let Dimension::Label(key) = dimension {
                validate_label_key(key).map_err(SpendwiseError::InvalidQuery)?;
            }
            if !seen.insert(dimension) {
                return Err(SpendwiseError::InvalidQuery(format!(
                    "dimension `{dimension}` appears twice in group_by"
                )));
            }
        }
        validate_filters(&self.filters)
    }
}
