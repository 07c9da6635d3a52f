// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost tracking, anomaly detection, and pricing for Spendwise.
//!
//! This crate provides:
//! - **Pricing**: exact per-model prices with optional class-based estimates
//! - **Cost tracker**: prices and records every LLM call, serves grouped reports
//! - **Anomaly detection**: recent window versus trailing baseline per group
//! - **Recommendations**: advisory suggestions between comparable options

pub mod anomaly;
pub mod pricing;
pub mod recommend;
pub mod recording;
pub mod tracker;

pub use anomaly::{Anomaly, AnomalyReport, DetectionParams, InsufficientBaseline};
pub use pricing::{PriceSource, PricingTable, ResolvedPrice, calculate_cost};
pub use recommend::{Recommendation, RecommendParams};
pub use tracker::{CostReport, CostTracker};
