// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Spendwise.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use spendwise_core::{Period, Severity};

/// Top-level Spendwise configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpendwiseConfig {
    /// Storage backend selection and connection settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Model pricing table and unknown-model policy.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Anomaly detection thresholds.
    #[serde(default)]
    pub anomaly: AnomalyConfig,

    /// Forecasting parameters.
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Budget projection settings and predefined budgets.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Model migration recommendation thresholds.
    #[serde(default)]
    pub recommend: RecommendConfig,

    /// Alert dispatch channels and defaults.
    #[serde(default)]
    pub alert: AlertConfig,
}

/// Which storage backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Process-lifetime only.
    Memory,
    /// Single-file embedded SQLite database.
    Sqlite,
    /// Networked PostgreSQL (requires the `postgres` feature).
    Postgres,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Backend variant.
    #[serde(default = "default_storage_kind")]
    pub backend: StorageKind,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// PostgreSQL connection URL. Required when `backend = "postgres"`.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Maximum pooled connections for networked backends.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a connection before reporting the backend unavailable.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_kind(),
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            database_url: None,
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Sqlite
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("spendwise").join("usage.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("usage.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

/// Per-1k-token prices in USD for one model.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// What to do when a model has no exact pricing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownModelPolicy {
    /// Fail ingestion with `UnknownModel`.
    #[default]
    Reject,
    /// Estimate with the first matching model class, then `default_class`.
    ClassDefault,
}

/// A substring-matched pricing class used by the `class_default` policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelClassPrice {
    /// Case-insensitive substring of the model identifier, e.g. `"haiku"`.
    pub contains: String,
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// Pricing table configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Exact model identifier → prices.
    #[serde(default)]
    pub models: BTreeMap<String, ModelPrice>,

    /// Policy for models missing from `models`.
    #[serde(default)]
    pub unknown_model: UnknownModelPolicy,

    /// Ordered class fallbacks, first match wins.
    #[serde(default)]
    pub classes: Vec<ModelClassPrice>,

    /// Last-resort estimate when no class matches.
    #[serde(default)]
    pub default_class: Option<ModelPrice>,
}

/// Anomaly detection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnomalyConfig {
    /// Flag when recent cost exceeds `multiplier` times the baseline average.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Minimum number of baseline events before a group can be flagged.
    #[serde(default = "default_min_baseline_samples")]
    pub min_baseline_samples: u64,

    /// Length of the recent window in hours.
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,

    /// Length of the trailing baseline window in hours.
    #[serde(default = "default_baseline_hours")]
    pub baseline_hours: u64,

    /// Label keys (or `model`) anomalies are grouped by.
    #[serde(default = "default_anomaly_group_by")]
    pub group_by: Vec<String>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            multiplier: default_multiplier(),
            min_baseline_samples: default_min_baseline_samples(),
            window_hours: default_window_hours(),
            baseline_hours: default_baseline_hours(),
            group_by: default_anomaly_group_by(),
        }
    }
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_min_baseline_samples() -> u64 {
    10
}

fn default_window_hours() -> u64 {
    24
}

fn default_baseline_hours() -> u64 {
    24 * 7
}

fn default_anomaly_group_by() -> Vec<String> {
    vec!["model".to_string()]
}

/// Forecasting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ForecastConfig {
    /// Minimum completed periods required to fit a trend.
    #[serde(default = "default_min_history_periods")]
    pub min_history_periods: usize,

    /// How many completed periods to look back over.
    #[serde(default = "default_lookback_periods")]
    pub lookback_periods: usize,

    /// `|slope| / mean` at or below this is labelled flat.
    #[serde(default = "default_flat_slope_ratio")]
    pub flat_slope_ratio: f64,

    /// Half-width of the forecast range in residual standard deviations.
    #[serde(default = "default_interval_stddevs")]
    pub interval_stddevs: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history_periods: default_min_history_periods(),
            lookback_periods: default_lookback_periods(),
            flat_slope_ratio: default_flat_slope_ratio(),
            interval_stddevs: default_interval_stddevs(),
        }
    }
}

fn default_min_history_periods() -> usize {
    3
}

fn default_lookback_periods() -> usize {
    12
}

fn default_flat_slope_ratio() -> f64 {
    0.05
}

fn default_interval_stddevs() -> f64 {
    1.0
}

/// A budget declared in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetEntry {
    pub amount_usd: f64,
    pub period: Period,
    /// Label (or `model`) equality filters selecting counted events.
    #[serde(default)]
    pub scope: BTreeMap<String, String>,
}

/// Budget tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Below this elapsed fraction, projection is suppressed.
    #[serde(default = "default_min_elapsed_fraction")]
    pub min_elapsed_fraction: f64,

    /// Emit a warning once spend reaches this fraction of the amount.
    #[serde(default = "default_warn_fraction")]
    pub warn_fraction: f64,

    /// Budgets applied at startup.
    #[serde(default)]
    pub budgets: Vec<BudgetEntry>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            min_elapsed_fraction: default_min_elapsed_fraction(),
            warn_fraction: default_warn_fraction(),
            budgets: Vec::new(),
        }
    }
}

fn default_min_elapsed_fraction() -> f64 {
    0.05
}

fn default_warn_fraction() -> f64 {
    0.8
}

/// Recommendation thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecommendConfig {
    /// Suggest a migration when the expensive option costs this much more per call
    /// (0.5 = 50% more).
    #[serde(default = "default_savings_threshold")]
    pub savings_threshold: f64,

    /// Smaller call count / larger call count must be at least this for two
    /// options to be comparable.
    #[serde(default = "default_min_volume_ratio")]
    pub min_volume_ratio: f64,

    /// Options with fewer calls than this are ignored.
    #[serde(default = "default_min_calls")]
    pub min_calls: u64,

    /// Dimension whose values are compared (usually `model`).
    #[serde(default = "default_compare")]
    pub compare: String,

    /// Dimensions that must match for two options to be comparable.
    #[serde(default)]
    pub within: Vec<String>,

    /// Look-back window in days.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            savings_threshold: default_savings_threshold(),
            min_volume_ratio: default_min_volume_ratio(),
            min_calls: default_min_calls(),
            compare: default_compare(),
            within: Vec::new(),
            lookback_days: default_lookback_days(),
        }
    }
}

fn default_savings_threshold() -> f64 {
    0.5
}

fn default_min_volume_ratio() -> f64 {
    0.25
}

fn default_min_calls() -> u64 {
    10
}

fn default_compare() -> String {
    "model".to_string()
}

fn default_lookback_days() -> u32 {
    30
}

/// An outbound webhook channel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Channel name referenced by rules.
    pub name: String,
    pub url: String,
    /// Optional bearer token.
    #[serde(default)]
    pub token: Option<String>,
    /// Only alerts at or above this severity are delivered.
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,
}

fn default_min_severity() -> Severity {
    Severity::Info
}

/// SMTP email channel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    #[serde(default = "default_email_name")]
    pub name: String,
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

fn default_email_name() -> String {
    "email".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

/// Alert dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertConfig {
    /// Master switch; when false, rules never fire.
    #[serde(default = "default_alert_enabled")]
    pub enabled: bool,

    /// Register the console channel under the name `console`.
    #[serde(default = "default_alert_enabled")]
    pub console: bool,

    /// Upper bound on a single network channel delivery, in seconds.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    /// Cooldown applied to rules that do not set their own, in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub default_cooldown_secs: u64,

    /// Number of dispatch failures retained for inspection.
    #[serde(default = "default_failure_history")]
    pub failure_history: usize,

    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,

    #[serde(default)]
    pub email: Option<EmailConfig>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: default_alert_enabled(),
            console: default_alert_enabled(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            default_cooldown_secs: default_cooldown_secs(),
            failure_history: default_failure_history(),
            webhooks: Vec::new(),
            email: None,
        }
    }
}

fn default_alert_enabled() -> bool {
    true
}

fn default_dispatch_timeout_secs() -> u64 {
    5
}

fn default_cooldown_secs() -> u64 {
    3600
}

fn default_failure_history() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_document_open_question_policy() {
        let config = SpendwiseConfig::default();
        assert_eq!(config.storage.backend, StorageKind::Sqlite);
        assert!((config.anomaly.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.anomaly.min_baseline_samples, 10);
        assert_eq!(config.forecast.min_history_periods, 3);
        assert!((config.forecast.interval_stddevs - 1.0).abs() < f64::EPSILON);
        assert!((config.budget.min_elapsed_fraction - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.pricing.unknown_model, UnknownModelPolicy::Reject);
    }

    #[test]
    fn database_path_defaults_to_usage_db() {
        let config = StorageConfig::default();
        assert!(config.database_path.ends_with("usage.db"));
    }
}
