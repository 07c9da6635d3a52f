// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model pricing tables and cost calculation.
//!
//! Prices are supplied as configuration in USD per thousand tokens. A model
//! resolves by exact identifier first. Under the `class_default` policy an
//! unlisted model falls back to the first class whose substring it contains
//! (case-insensitive), then to `default_class`.

use std::collections::BTreeMap;

use spendwise_config::model::{ModelPrice, PricingConfig, UnknownModelPolicy};
use spendwise_core::{Cost, SpendwiseError};

/// Where a resolved price came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceSource {
    /// Exact entry for the model identifier.
    Exact,
    /// Estimated from a substring class.
    Class(String),
    /// Estimated from the configured default class.
    Default,
}

impl PriceSource {
    pub fn is_estimate(&self) -> bool {
        !matches!(self, Self::Exact)
    }
}

/// Resolved pricing for one lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrice {
    pub price: ModelPrice,
    pub source: PriceSource,
}

/// Immutable model → price table.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    models: BTreeMap<String, ModelPrice>,
    policy: UnknownModelPolicy,
    /// Lowercased substring paired with its price, in match order.
    classes: Vec<(String, ModelPrice)>,
    default_class: Option<ModelPrice>,
}

impl PricingTable {
    /// An empty table that rejects every model.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PricingConfig) -> Self {
        Self {
            models: config.models.clone(),
            policy: config.unknown_model,
            classes: config
                .classes
                .iter()
                .map(|c| {
                    (
                        c.contains.to_lowercase(),
                        ModelPrice {
                            input_per_1k: c.input_per_1k,
                            output_per_1k: c.output_per_1k,
                        },
                    )
                })
                .collect(),
            default_class: config.default_class,
        }
    }

    /// Add or replace an exact model entry.
    pub fn with_model(mut self, model: impl Into<String>, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.models.insert(
            model.into(),
            ModelPrice {
                input_per_1k,
                output_per_1k,
            },
        );
        self
    }

    /// Switch to class-based estimation for unlisted models.
    pub fn with_class(mut self, contains: &str, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.policy = UnknownModelPolicy::ClassDefault;
        self.classes.push((
            contains.to_lowercase(),
            ModelPrice {
                input_per_1k,
                output_per_1k,
            },
        ));
        self
    }

    pub fn with_default_class(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.policy = UnknownModelPolicy::ClassDefault;
        self.default_class = Some(ModelPrice {
            input_per_1k,
            output_per_1k,
        });
        self
    }

    pub fn policy(&self) -> UnknownModelPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Resolve the price for `model`, or `UnknownModel` when nothing applies.
    pub fn lookup(&self, model: &str) -> Result<ResolvedPrice, SpendwiseError> {
        if let Some(price) = self.models.get(model) {
            return Ok(ResolvedPrice {
                price: *price,
                source: PriceSource::Exact,
            });
        }
        if self.policy == UnknownModelPolicy::ClassDefault {
            let lower = model.to_lowercase();
            if let Some((class, price)) = self.classes.iter().find(|(c, _)| lower.contains(c.as_str())) {
                return Ok(ResolvedPrice {
                    price: *price,
                    source: PriceSource::Class(class.clone()),
                });
            }
            if let Some(price) = self.default_class {
                return Ok(ResolvedPrice {
                    price,
                    source: PriceSource::Default,
                });
            }
        }
        Err(SpendwiseError::UnknownModel {
            model: model.to_string(),
        })
    }
}

/// Cost of one call at `price`.
///
/// Formula: input / 1000 * input_price + output / 1000 * output_price, with
/// each term rounded to the nearest nano-USD.
pub fn calculate_cost(price: &ModelPrice, input_tokens: u64, output_tokens: u64) -> Cost {
    Cost::for_tokens(input_tokens, price.input_per_1k)
        + Cost::for_tokens(output_tokens, price.output_per_1k)
}
