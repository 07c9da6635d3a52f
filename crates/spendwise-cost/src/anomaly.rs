// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost anomaly detection.
//!
//! For every group key, the cost in a recent window is compared with the
//! trailing baseline average scaled to the same length. A group is flagged
//! when `recent > multiplier * baseline_average` and the baseline holds at
//! least the configured number of events. A zero baseline is never flagged.

use std::collections::HashMap;

use chrono::TimeDelta;
use serde::Serialize;
use tracing::{debug, warn};

use spendwise_core::{Cost, CostQuery, Dimension, GroupKey, GroupRow, SpendwiseError, TimeRange};

use crate::tracker::CostTracker;

/// A group whose recent cost outran its baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub key: GroupKey,
    pub group_by: Vec<Dimension>,
    pub window: TimeRange,
    /// Baseline cost scaled to the window length.
    pub baseline_average: Cost,
    pub observed: Cost,
    /// `observed / baseline_average`.
    pub deviation_ratio: f64,
}

impl Anomaly {
    /// Rendered group key, e.g. `agent_id=support`.
    pub fn scope(&self) -> String {
        self.key.render(&self.group_by)
    }
}

/// A recent group that could not be judged for lack of baseline events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsufficientBaseline {
    pub key: GroupKey,
    pub samples: u64,
    pub required: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub window: TimeRange,
    pub baseline_window: TimeRange,
    pub anomalies: Vec<Anomaly>,
    pub insufficient: Vec<InsufficientBaseline>,
}

/// Knobs for one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionParams {
    pub group_by: Vec<Dimension>,
    pub multiplier: f64,
    pub min_baseline_samples: u64,
}

impl DetectionParams {
    fn validate(&self) -> Result<(), SpendwiseError> {
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(SpendwiseError::InvalidQuery(format!(
                "anomaly multiplier must be a positive number, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// Compare grouped recent rows against grouped baseline rows.
///
/// Both row sets must be grouped by the same dimensions. Output follows the
/// order of `recent`.
pub fn find_anomalies(
    recent: &[GroupRow],
    baseline: &[GroupRow],
    window: TimeRange,
    baseline_window: TimeRange,
    params: &DetectionParams,
) -> AnomalyReport {
    let window_us = window.duration().num_microseconds().unwrap_or(i64::MAX) as f64;
    let baseline_us = baseline_window.duration().num_microseconds().unwrap_or(i64::MAX) as f64;
    let by_key: HashMap<&GroupKey, &GroupRow> = baseline.iter().map(|r| (&r.key, r)).collect();

    let mut anomalies = Vec::new();
    let mut insufficient = Vec::new();
    for row in recent {
        let base = by_key.get(&row.key);
        let samples = base.map_or(0, |b| b.count);
        if samples < params.min_baseline_samples {
            insufficient.push(InsufficientBaseline {
                key: row.key.clone(),
                samples,
                required: params.min_baseline_samples,
            });
            continue;
        }
        let base_nanos = base.map_or(0, |b| b.total_cost.nanos());
        if base_nanos <= 0 {
            continue;
        }
        let average = base_nanos as f64 * window_us / baseline_us;
        let observed = row.total_cost.nanos() as f64;
        if observed > params.multiplier * average {
            anomalies.push(Anomaly {
                key: row.key.clone(),
                group_by: params.group_by.clone(),
                window,
                baseline_average: Cost::from_nanos(average.round() as i64),
                observed: row.total_cost,
                deviation_ratio: observed / average,
            });
        }
    }

    AnomalyReport {
        window,
        baseline_window,
        anomalies,
        insufficient,
    }
}

impl CostTracker {
    /// Detection parameters from configuration with an explicit multiplier.
    pub fn detection_params(&self, multiplier: f64) -> Result<DetectionParams, SpendwiseError> {
        let group_by = self
            .anomaly
            .group_by
            .iter()
            .map(|d| d.parse::<Dimension>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DetectionParams {
            group_by,
            multiplier,
            min_baseline_samples: self.anomaly.min_baseline_samples,
        })
    }

    /// Flag groups whose cost in `window` exceeds `multiplier` times their
    /// `baseline_window` average.
    pub async fn detect_anomalies(
        &self,
        window: TimeRange,
        baseline_window: TimeRange,
        multiplier: f64,
    ) -> Result<AnomalyReport, SpendwiseError> {
        let params = self.detection_params(multiplier)?;
        self.detect_with(window, baseline_window, &params).await
    }

    /// Detection over the configured windows ending now.
    pub async fn detect_recent_anomalies(&self) -> Result<AnomalyReport, SpendwiseError> {
        let now = self.now();
        let window = TimeRange::trailing(now, hours(self.anomaly.window_hours));
        let baseline = TimeRange::trailing(window.start, hours(self.anomaly.baseline_hours));
        self.detect_anomalies(window, baseline, self.anomaly.multiplier)
            .await
    }

    pub async fn detect_with(
        &self,
        window: TimeRange,
        baseline_window: TimeRange,
        params: &DetectionParams,
    ) -> Result<AnomalyReport, SpendwiseError> {
        params.validate()?;
        if window.is_empty() || baseline_window.is_empty() {
            return Err(SpendwiseError::InvalidQuery(
                "anomaly windows must be non-empty".to_string(),
            ));
        }

        let recent = self
            .report(CostQuery::new(window).group_by(params.group_by.iter().cloned()))
            .await?;
        let baseline = self
            .report(CostQuery::new(baseline_window).group_by(params.group_by.iter().cloned()))
            .await?;

        let report = find_anomalies(&recent.rows, &baseline.rows, window, baseline_window, params);
        for anomaly in &report.anomalies {
            warn!(
                group = %anomaly.scope(),
                observed_usd = anomaly.observed.usd(),
                baseline_usd = anomaly.baseline_average.usd(),
                ratio = anomaly.deviation_ratio,
                "cost anomaly detected"
            );
        }
        debug!(
            anomalies = report.anomalies.len(),
            insufficient = report.insufficient.len(),
            "anomaly detection finished"
        );
        Ok(report)
    }
}

/// Longest configurable window, a century.
const MAX_WINDOW_HOURS: u64 = 24 * 366 * 100;

fn hours(h: u64) -> TimeDelta {
    TimeDelta::hours(h.min(MAX_WINDOW_HOURS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap() + TimeDelta::hours(h)
    }

    fn row(key: &str, count: u64, nanos: i64) -> GroupRow {
        GroupRow {
            key: GroupKey(vec![Some(key.to_string())]),
            count,
            total_cost: Cost::from_nanos(nanos),
            total_tokens: 0,
        }
    }

    fn params() -> DetectionParams {
        DetectionParams {
            group_by: vec![Dimension::label("agent_id")],
            multiplier: 2.0,
            min_baseline_samples: 10,
        }
    }

    fn windows() -> (TimeRange, TimeRange) {
        // One recent day against the seven days before it.
        (
            TimeRange::new(t(0), t(24)).unwrap(),
            TimeRange::new(t(-168), t(0)).unwrap(),
        )
    }

    #[test]
    fn spike_above_multiplier_is_flagged() {
        let (window, baseline) = windows();
        let report = find_anomalies(
            &[row("support", 5, 3_000)],
            &[row("support", 70, 7_000)],
            window,
            baseline,
            &params(),
        );
        assert_eq!(report.anomalies.len(), 1);
        let anomaly = &report.anomalies[0];
        assert_eq!(anomaly.baseline_average, Cost::from_nanos(1_000));
        assert!((anomaly.deviation_ratio - 3.0).abs() < 1e-9);
        assert_eq!(anomaly.scope(), "agent_id=support");
    }

    #[test]
    fn at_exactly_multiplier_is_not_flagged() {
        let (window, baseline) = windows();
        let report = find_anomalies(
            &[row("support", 5, 2_000)],
            &[row("support", 70, 7_000)],
            window,
            baseline,
            &params(),
        );
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn zero_baseline_is_never_flagged() {
        let (window, baseline) = windows();
        let report = find_anomalies(
            &[row("support", 3, 50_000)],
            &[row("support", 40, 0)],
            window,
            baseline,
            &params(),
        );
        assert!(report.anomalies.is_empty());
        assert!(report.insufficient.is_empty());
    }

    #[test]
    fn thin_baseline_is_reported_not_flagged() {
        let (window, baseline) = windows();
        let report = find_anomalies(
            &[row("new", 1, 99_999), row("support", 1, 99_999)],
            &[row("support", 9, 10)],
            window,
            baseline,
            &params(),
        );
        assert!(report.anomalies.is_empty());
        assert_eq!(
            report.insufficient,
            vec![
                InsufficientBaseline {
                    key: GroupKey(vec![Some("new".into())]),
                    samples: 0,
                    required: 10,
                },
                InsufficientBaseline {
                    key: GroupKey(vec![Some("support".into())]),
                    samples: 9,
                    required: 10,
                },
            ]
        );
    }

    #[test]
    fn invalid_multiplier_is_rejected() {
        let mut p = params();
        p.multiplier = 0.0;
        assert!(p.validate().is_err());
        p.multiplier = f64::NAN;
        assert!(p.validate().is_err());
    }
}
