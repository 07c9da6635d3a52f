// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Storage backends extend the [`Adapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod budget;
pub mod clock;
pub mod observer;
pub mod storage;

pub use adapter::Adapter;
pub use budget::{BudgetDefinition, BudgetStore, SlotKey};
pub use clock::{Clock, SystemClock};
pub use observer::UsageObserver;
pub use storage::StorageBackend;
