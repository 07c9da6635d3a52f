// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Spendwise integration tests.
//!
//! Provides deterministic fixtures and a harness that wires a complete
//! stack without external services.
//!
//! # Components
//!
//! - [`FixedClock`] - Settable clock shared by every component
//! - [`RecordingChannel`] - Notification channel that captures alerts
//! - [`TestHarness`] - Storage, cost tracker, forecaster, budgets, and alerts

pub mod fixtures;
pub mod harness;
pub mod mock_channel;

pub use fixtures::{FixedClock, init_tracing, labels, pricing_fixture};
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_channel::RecordingChannel;
