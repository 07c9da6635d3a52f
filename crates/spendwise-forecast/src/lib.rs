// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spend forecasting and budget tracking for Spendwise.
//!
//! The [`Forecaster`] fits a least-squares trend through completed period
//! totals. The [`BudgetTracker`] stores append-only budget definitions and
//! projects each one to the end of its current period.

pub mod budget;
pub mod forecast;

pub use budget::{BudgetStatus, BudgetTracker, Projection, ProjectionBasis, project_remainder};
pub use forecast::{Forecast, Forecaster, Trend, TrendFit, bucket_history, fit_trend};
