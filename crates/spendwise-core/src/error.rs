// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Spendwise telemetry pipeline.

use thiserror::Error;

/// The primary error type used across storage backends, the cost tracker,
/// forecasting, budgeting, and alert dispatch.
#[derive(Debug, Error)]
pub enum SpendwiseError {
    /// No pricing entry exists for the model and no fallback applies.
    #[error("unknown model `{model}`: no pricing entry")]
    UnknownModel { model: String },

    /// The storage backend could not be reached (connection refused, closed, pool exhausted).
    #[error("storage backend `{backend}` unavailable: {source}")]
    StorageUnavailable {
        backend: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend was reachable but the operation failed (constraint, serialization, SQL).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed filter, group-by, or time range. Raised before the backend is touched.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Event labels violate the key/value rules.
    #[error("invalid labels: {0}")]
    InvalidLabels(String),

    /// Not enough completed periods to fit a forecast.
    #[error("insufficient history: need {required} periods, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    /// A notification channel failed to deliver an alert.
    #[error("dispatch to `{channel}` failed: {message}")]
    DispatchFailure { channel: String, message: String },

    /// Configuration errors (invalid values, missing sections).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SpendwiseError {
    /// Wrap any error as a generic storage failure.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Wrap any error as an unreachable-backend failure for the named backend.
    pub fn unavailable<E>(backend: &str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::StorageUnavailable {
            backend: backend.to_string(),
            source: source.into(),
        }
    }

    /// Whether this error means "not enough data yet" rather than a real failure.
    pub fn is_cold_start(&self) -> bool {
        matches!(self, Self::InsufficientHistory { .. })
    }
}
