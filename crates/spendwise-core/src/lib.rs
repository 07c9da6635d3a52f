// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Spendwise LLM usage telemetry pipeline.
//!
//! This crate provides the data model (usage events, exact costs, labels),
//! the dimensional query model, UTC time ranges and calendar periods, the
//! workspace error type, and the adapter traits every storage backend
//! implements.

pub mod error;
pub mod query;
pub mod time;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::SpendwiseError;
pub use query::{CostQuery, Dimension, Filter, GroupKey, GroupRow};
pub use time::{Period, SymbolicRange, TimeRange};
pub use types::{AdapterType, Cost, HealthStatus, Labels, Severity, UsageEvent};

pub use traits::{
    Adapter, BudgetDefinition, BudgetStore, Clock, SlotKey, StorageBackend, SystemClock,
    UsageObserver,
};
