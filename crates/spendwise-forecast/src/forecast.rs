// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Least-squares spend forecasting over completed calendar periods.
//!
//! History is the per-period total for each completed period before the
//! current one, starting at the first period that holds any matching event.
//! A line is fitted through those totals and evaluated at the current
//! period's index.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tracing::debug;

use spendwise_config::model::ForecastConfig;
use spendwise_core::{Cost, Filter, Period, SpendwiseError, TimeRange};
use spendwise_cost::CostTracker;

/// Direction of the fitted trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Trend {
    Increasing,
    Flat,
    Decreasing,
}

/// Projected total for one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub period: Period,
    /// The period being forecast.
    pub window: TimeRange,
    /// Fitted value at the forecast period, never negative.
    pub point: Cost,
    pub low: Cost,
    pub high: Cost,
    pub trend: Trend,
    /// Fitted change per period in USD.
    pub slope_usd: f64,
    /// Totals the line was fitted to, oldest first.
    pub history: Vec<Cost>,
}

/// The numeric part of a forecast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendFit {
    pub point: Cost,
    pub low: Cost,
    pub high: Cost,
    pub trend: Trend,
    /// Nano-USD per period.
    pub slope: f64,
    pub residual_std: f64,
}

/// Fit ordinary least squares through `history` (x = 0, 1, ...) and
/// evaluate it at x = `history.len()`.
pub fn fit_trend(history: &[Cost], config: &ForecastConfig) -> Result<TrendFit, SpendwiseError> {
    let required = config.min_history_periods.max(3);
    let n = history.len();
    if n < required {
        return Err(SpendwiseError::InsufficientHistory {
            required,
            available: n,
        });
    }

    let ys: Vec<f64> = history.iter().map(|c| c.nanos() as f64).collect();
    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = ys.iter().sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let sse: f64 = ys
        .iter()
        .enumerate()
        .map(|(i, y)| {
            let r = y - (intercept + slope * i as f64);
            r * r
        })
        .sum();
    let residual_std = (sse / (nf - 2.0)).sqrt();

    let point = (intercept + slope * nf).max(0.0);
    let spread = config.interval_stddevs * residual_std;
    let trend = if y_mean <= 0.0 || slope.abs() / y_mean <= config.flat_slope_ratio {
        Trend::Flat
    } else if slope > 0.0 {
        Trend::Increasing
    } else {
        Trend::Decreasing
    };

    Ok(TrendFit {
        point: nanos(point),
        low: nanos((point - spread).max(0.0)),
        high: nanos(point + spread),
        trend,
        slope,
        residual_std,
    })
}

fn nanos(value: f64) -> Cost {
    Cost::from_nanos(value.round() as i64)
}

/// Per-period totals for the completed periods before `now`.
///
/// Leading periods with no matching events are dropped, so a fresh install
/// reports only the periods it has actually observed.
pub fn bucket_history(
    windows: &[TimeRange],
    timestamps_and_costs: impl IntoIterator<Item = (DateTime<Utc>, Cost)>,
) -> Vec<(TimeRange, Cost)> {
    let mut totals = vec![Cost::ZERO; windows.len()];
    let mut seen = vec![false; windows.len()];
    for (ts, cost) in timestamps_and_costs {
        let idx = windows.partition_point(|w| w.end <= ts);
        if idx < windows.len() && windows[idx].contains(ts) {
            totals[idx] += cost;
            seen[idx] = true;
        }
    }
    let first = seen.iter().position(|s| *s).unwrap_or(windows.len());
    windows[first..]
        .iter()
        .copied()
        .zip(totals[first..].iter().copied())
        .collect()
}

/// Projects future spend from recorded history.
pub struct Forecaster {
    costs: Arc<CostTracker>,
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(costs: Arc<CostTracker>, config: ForecastConfig) -> Self {
        Self { costs, config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast the current `period` for events matching `filters`.
    pub async fn forecast(
        &self,
        period: Period,
        filters: &[Filter],
    ) -> Result<Forecast, SpendwiseError> {
        self.forecast_at(period, filters, self.costs.now()).await
    }

    pub async fn forecast_at(
        &self,
        period: Period,
        filters: &[Filter],
        now: DateTime<Utc>,
    ) -> Result<Forecast, SpendwiseError> {
        let history: Vec<Cost> = self
            .history(period, filters, now)
            .await?
            .into_iter()
            .map(|(_, cost)| cost)
            .collect();
        let fit = fit_trend(&history, &self.config)?;
        debug!(
            %period,
            periods = history.len(),
            point_usd = fit.point.usd(),
            trend = %fit.trend,
            "forecast fitted"
        );
        Ok(Forecast {
            period,
            window: period.window(now),
            point: fit.point,
            low: fit.low,
            high: fit.high,
            trend: fit.trend,
            slope_usd: fit.slope / Cost::NANOS_PER_USD as f64,
            history,
        })
    }

    /// Completed-period totals used as forecasting input, oldest first.
    pub async fn history(
        &self,
        period: Period,
        filters: &[Filter],
        now: DateTime<Utc>,
    ) -> Result<Vec<(TimeRange, Cost)>, SpendwiseError> {
        let windows = period.completed_windows(now, self.config.lookback_periods);
        let (Some(first), Some(last)) = (windows.first(), windows.last()) else {
            return Ok(Vec::new());
        };
        let span = TimeRange::new(first.start, last.end)?;
        let events = self.costs.scan(filters, &span).await?;
        Ok(bucket_history(
            &windows,
            events.iter().map(|e| (e.timestamp, e.cost)),
        ))
    }
}
