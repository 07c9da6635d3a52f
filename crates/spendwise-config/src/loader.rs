// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-based layered loading.
//!
//! Hierarchy: `./spendwise.toml` > `~/.config/spendwise/spendwise.toml` >
//! `/etc/spendwise/spendwise.toml`, with `SPENDWISE_` environment overrides on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::SpendwiseConfig;

const ENV_PREFIX: &str = "SPENDWISE_";

/// Top-level sections that environment variables may address.
const SECTIONS: &[&str] = &[
    "storage",
    "pricing",
    "anomaly",
    "forecast",
    "budget",
    "recommend",
    "alert",
];

/// Config files consulted by [`load_config`], lowest precedence first.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/spendwise/spendwise.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("spendwise").join("spendwise.toml"));
    }
    paths.push(PathBuf::from("spendwise.toml"));
    paths
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. Each path from [`search_paths`] that exists
/// 3. `SPENDWISE_*` environment variables
pub fn load_config() -> Result<SpendwiseConfig, figment::Error> {
    build_figment().extract()
}

/// Load from an inline TOML document over the defaults. Ignores the environment.
pub fn load_config_from_str(toml_content: &str) -> Result<SpendwiseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SpendwiseConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load from one explicit file, with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SpendwiseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SpendwiseConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full figment before extraction, for callers that want provenance metadata.
pub fn build_figment() -> Figment {
    search_paths().into_iter().fold(
        Figment::new().merge(Serialized::defaults(SpendwiseConfig::default())),
        |figment, path| figment.merge(Toml::file(path)),
    )
    .merge(env_provider())
}

/// Map `SPENDWISE_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `SPENDWISE_STORAGE_DATABASE_URL` lands on `storage.database_url`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| format!("{section}.{rest}"))
        })
        .unwrap_or_else(|| key.to_string())
}
