// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Spendwise cost telemetry pipeline.
//!
//! TOML files are merged along an XDG hierarchy, `SPENDWISE_*` environment
//! variables override them, unknown keys are rejected, and every failure is
//! rendered as a miette diagnostic with "did you mean?" suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use spendwise_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("storage backend: {:?}", config.storage.backend);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::SpendwiseConfig;

/// Load configuration from the XDG hierarchy and validate it.
///
/// On a figment failure the TOML sources that were consulted are re-read so
/// diagnostics can point at the offending line.
pub fn load_and_validate() -> Result<SpendwiseConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => finish(config),
        Err(err) => {
            let sources = collect_toml_sources(&loader::search_paths());
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load and validate a single TOML file plus env overrides.
pub fn load_and_validate_path(path: &Path) -> Result<SpendwiseConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => finish(config),
        Err(err) => {
            let sources = collect_toml_sources(&[path.to_path_buf()]);
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load and validate an inline TOML document. No files, no environment.
pub fn load_and_validate_str(toml_content: &str) -> Result<SpendwiseConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => finish(config),
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

fn finish(config: SpendwiseConfig) -> Result<SpendwiseConfig, Vec<ConfigError>> {
    validation::validate_config(&config)?;
    tracing::debug!(
        backend = ?config.storage.backend,
        models = config.pricing.models.len(),
        budgets = config.budget.budgets.len(),
        "configuration loaded"
    );
    Ok(config)
}

fn collect_toml_sources(paths: &[std::path::PathBuf]) -> Vec<(String, String)> {
    paths
        .iter()
        .filter_map(|path| {
            std::fs::read_to_string(path)
                .ok()
                .map(|content| (path.display().to_string(), content))
        })
        .collect()
}
