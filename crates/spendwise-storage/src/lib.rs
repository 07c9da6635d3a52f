// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage backends for Spendwise usage records and budget definitions.
//!
//! Three interchangeable implementations of
//! [`StorageBackend`](spendwise_core::StorageBackend) and
//! [`BudgetStore`](spendwise_core::BudgetStore):
//!
//! - [`MemoryStorage`]: process lifetime only
//! - [`SqliteStorage`]: one WAL-mode file, embedded refinery migrations,
//!   writes serialized through `tokio-rusqlite`
//! - `PostgresStorage`: pooled `sqlx` connections (feature `postgres`)
//!
//! [`open_backend`] picks one from [`StorageConfig`](spendwise_config::model::StorageConfig).

pub mod database;
pub mod factory;
pub mod memory;
pub mod migrations;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod queries;
pub mod sqlite;

pub use database::Database;
pub use factory::{open_backend, Backend};
pub use memory::MemoryStorage;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresStorage};
pub use sqlite::SqliteStorage;
