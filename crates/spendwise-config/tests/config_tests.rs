// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for Spendwise configuration loading.

use std::io::Write;

use spendwise_config::diagnostic::ConfigError;
use spendwise_config::model::{StorageKind, UnknownModelPolicy};
use spendwise_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};
use spendwise_core::{Period, Severity};

#[test]
fn full_document_deserializes() {
    let toml = r#"
[storage]
backend = "postgres"
database_url = "postgres://spendwise@localhost/usage"
max_connections = 4

[pricing]
unknown_model = "class_default"
default_class = { input_per_1k = 0.01, output_per_1k = 0.03 }

[pricing.models."gpt-4"]
input_per_1k = 0.03
output_per_1k = 0.06

[[pricing.classes]]
contains = "haiku"
input_per_1k = 0.0008
output_per_1k = 0.004

[anomaly]
multiplier = 3.0
group_by = ["agent_id", "model"]

[forecast]
lookback_periods = 6

[budget]
warn_fraction = 0.9

[[budget.budgets]]
amount_usd = 500.0
period = "monthly"
scope = { team = "search" }

[recommend]
within = ["agent_id"]

[alert]
dispatch_timeout_secs = 2

[[alert.webhooks]]
name = "ops"
url = "https://hooks.example.com/spend"
token = "secret"
min_severity = "warning"
"#;

    let config = load_and_validate_str(toml).expect("valid document");
    assert_eq!(config.storage.backend, StorageKind::Postgres);
    assert_eq!(config.storage.max_connections, 4);
    assert_eq!(config.pricing.unknown_model, UnknownModelPolicy::ClassDefault);
    assert_eq!(config.pricing.models["gpt-4"].output_per_1k, 0.06);
    assert_eq!(config.pricing.classes[0].contains, "haiku");
    assert_eq!(config.anomaly.group_by, vec!["agent_id", "model"]);
    assert_eq!(config.forecast.lookback_periods, 6);
    assert_eq!(config.budget.budgets[0].period, Period::Monthly);
    assert_eq!(config.budget.budgets[0].scope["team"], "search");
    assert_eq!(config.recommend.within, vec!["agent_id"]);
    assert_eq!(config.alert.webhooks[0].min_severity, Severity::Warning);
    assert_eq!(config.alert.dispatch_timeout_secs, 2);
}

#[test]
fn empty_document_uses_defaults() {
    let config = load_and_validate_str("").expect("defaults validate");
    assert_eq!(config.storage.backend, StorageKind::Sqlite);
    assert_eq!(config.anomaly.min_baseline_samples, 10);
    assert!(config.alert.console);
    assert!(config.budget.budgets.is_empty());
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = "[anomaly]\nmultiplir = 3.0\n";
    let errors = load_and_validate_str(toml).expect_err("unknown key rejected");
    let found = errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::UnknownKey { suggestion: Some(s), .. } if s == "multiplier"
        )
    });
    assert!(found, "expected a `multiplier` suggestion, got {errors:?}");
}

#[test]
fn unknown_top_level_section_rejected() {
    assert!(load_config_from_str("[telemetry]\nenabled = true\n").is_err());
}

#[test]
fn wrong_type_reports_invalid_type() {
    let errors = load_and_validate_str("[forecast]\nlookback_periods = \"twelve\"\n")
        .expect_err("string for integer rejected");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("lookback_periods"))));
}

#[test]
fn invalid_period_rejected() {
    let toml = "[[budget.budgets]]\namount_usd = 10.0\nperiod = \"hourly\"\n";
    assert!(load_and_validate_str(toml).is_err());
}

#[test]
fn semantic_errors_are_all_reported() {
    let toml = r#"
[anomaly]
multiplier = 0.5

[budget]
min_elapsed_fraction = 1.5
"#;
    let errors = load_and_validate_str(toml).expect_err("validation fails");
    assert!(errors.len() >= 2, "got {errors:?}");
    assert!(errors.iter().all(|e| matches!(e, ConfigError::Validation { .. })));
}

#[test]
fn loads_from_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[storage]\nbackend = \"memory\"\n").unwrap();

    let config = load_and_validate_path(file.path()).expect("file loads");
    assert_eq!(config.storage.backend, StorageKind::Memory);
}
