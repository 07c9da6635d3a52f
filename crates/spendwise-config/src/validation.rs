// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: value ranges, backend
//! prerequisites, dimension names, and channel name uniqueness.

use std::collections::HashSet;

use spendwise_core::Dimension;

use crate::diagnostic::ConfigError;
use crate::model::{SpendwiseConfig, StorageKind, UnknownModelPolicy};

/// Validate a deserialized configuration.
///
/// Collects every problem instead of failing on the first one.
pub fn validate_config(config: &SpendwiseConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    // storage
    let storage = &config.storage;
    match storage.backend {
        StorageKind::Sqlite if storage.database_path.trim().is_empty() => {
            fail("storage.database_path must not be empty for the sqlite backend".into());
        }
        StorageKind::Postgres if storage.database_url.as_deref().is_none_or(str::is_empty) => {
            fail("storage.database_url is required for the postgres backend".into());
        }
        _ => {}
    }
    if storage.max_connections == 0 {
        fail("storage.max_connections must be at least 1".into());
    }

    // pricing
    for (model, price) in &config.pricing.models {
        if !valid_price(price.input_per_1k) || !valid_price(price.output_per_1k) {
            fail(format!(
                "pricing.models.\"{model}\" prices must be finite and non-negative"
            ));
        }
    }
    for (i, class) in config.pricing.classes.iter().enumerate() {
        if class.contains.trim().is_empty() {
            fail(format!("pricing.classes[{i}].contains must not be empty"));
        }
        if !valid_price(class.input_per_1k) || !valid_price(class.output_per_1k) {
            fail(format!(
                "pricing.classes[{i}] prices must be finite and non-negative"
            ));
        }
    }
    if let Some(default) = &config.pricing.default_class {
        if !valid_price(default.input_per_1k) || !valid_price(default.output_per_1k) {
            fail("pricing.default_class prices must be finite and non-negative".into());
        }
    }
    if config.pricing.unknown_model == UnknownModelPolicy::ClassDefault
        && config.pricing.classes.is_empty()
        && config.pricing.default_class.is_none()
    {
        fail(
            "pricing.unknown_model = \"class_default\" needs pricing.classes or pricing.default_class"
                .into(),
        );
    }

    // anomaly
    let anomaly = &config.anomaly;
    if !anomaly.multiplier.is_finite() || anomaly.multiplier <= 1.0 {
        fail(format!(
            "anomaly.multiplier must be greater than 1.0, got {}",
            anomaly.multiplier
        ));
    }
    if anomaly.window_hours == 0 || anomaly.baseline_hours == 0 {
        fail("anomaly.window_hours and anomaly.baseline_hours must be positive".into());
    }
    check_dimensions("anomaly.group_by", &anomaly.group_by, &mut fail);

    // forecast
    let forecast = &config.forecast;
    if forecast.min_history_periods < 3 {
        fail(format!(
            "forecast.min_history_periods must be at least 3, got {}",
            forecast.min_history_periods
        ));
    }
    if forecast.lookback_periods < forecast.min_history_periods {
        fail(format!(
            "forecast.lookback_periods ({}) must be >= forecast.min_history_periods ({})",
            forecast.lookback_periods, forecast.min_history_periods
        ));
    }
    if !(forecast.flat_slope_ratio.is_finite() && forecast.flat_slope_ratio >= 0.0) {
        fail("forecast.flat_slope_ratio must be non-negative".into());
    }
    if !(forecast.interval_stddevs.is_finite() && forecast.interval_stddevs >= 0.0) {
        fail("forecast.interval_stddevs must be non-negative".into());
    }

    // budget
    let budget = &config.budget;
    if !(0.0..1.0).contains(&budget.min_elapsed_fraction) {
        fail(format!(
            "budget.min_elapsed_fraction must be in [0, 1), got {}",
            budget.min_elapsed_fraction
        ));
    }
    if !(budget.warn_fraction > 0.0 && budget.warn_fraction <= 1.0) {
        fail(format!(
            "budget.warn_fraction must be in (0, 1], got {}",
            budget.warn_fraction
        ));
    }
    for (i, entry) in budget.budgets.iter().enumerate() {
        if !(entry.amount_usd.is_finite() && entry.amount_usd > 0.0) {
            fail(format!(
                "budget.budgets[{i}].amount_usd must be positive, got {}",
                entry.amount_usd
            ));
        }
        let keys: Vec<String> = entry.scope.keys().cloned().collect();
        check_dimensions(&format!("budget.budgets[{i}].scope"), &keys, &mut fail);
    }

    // recommend
    let recommend = &config.recommend;
    if !(recommend.savings_threshold.is_finite() && recommend.savings_threshold > 0.0) {
        fail("recommend.savings_threshold must be positive".into());
    }
    if !(recommend.min_volume_ratio > 0.0 && recommend.min_volume_ratio <= 1.0) {
        fail(format!(
            "recommend.min_volume_ratio must be in (0, 1], got {}",
            recommend.min_volume_ratio
        ));
    }
    check_dimensions(
        "recommend.compare",
        std::slice::from_ref(&recommend.compare),
        &mut fail,
    );
    check_dimensions("recommend.within", &recommend.within, &mut fail);
    if recommend.within.contains(&recommend.compare) {
        fail(format!(
            "recommend.within must not contain the compared dimension `{}`",
            recommend.compare
        ));
    }

    // alert
    let alert = &config.alert;
    if alert.dispatch_timeout_secs == 0 {
        fail("alert.dispatch_timeout_secs must be at least 1".into());
    }
    let mut channel_names = HashSet::new();
    if alert.console {
        channel_names.insert("console");
    }
    for (i, hook) in alert.webhooks.iter().enumerate() {
        if hook.name.trim().is_empty() {
            fail(format!("alert.webhooks[{i}].name must not be empty"));
        } else if !channel_names.insert(hook.name.as_str()) {
            fail(format!("duplicate alert channel name `{}`", hook.name));
        }
        if !(hook.url.starts_with("http://") || hook.url.starts_with("https://")) {
            fail(format!(
                "alert.webhooks[{i}].url must be an http(s) URL, got `{}`",
                hook.url
            ));
        }
    }
    if let Some(email) = &alert.email {
        if !channel_names.insert(email.name.as_str()) {
            fail(format!("duplicate alert channel name `{}`", email.name));
        }
        if email.smtp_host.trim().is_empty() {
            fail("alert.email.smtp_host must not be empty".into());
        }
        if email.to.is_empty() {
            fail("alert.email.to must list at least one recipient".into());
        }
        if email.username.is_some() != email.password.is_some() {
            fail("alert.email.username and alert.email.password must be set together".into());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn valid_price(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn check_dimensions(field: &str, names: &[String], fail: &mut impl FnMut(String)) {
    let mut seen = HashSet::new();
    for name in names {
        if let Err(err) = name.parse::<Dimension>() {
            fail(format!("{field}: {err}"));
        } else if !seen.insert(name) {
            fail(format!("{field}: `{name}` listed twice"));
        }
    }
}
