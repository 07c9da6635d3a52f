// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed SQL operations against a [`Database`](crate::database::Database).

pub mod budgets;
pub mod events;
