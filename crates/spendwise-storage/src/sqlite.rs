// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded single-file SQLite backend.

use async_trait::async_trait;
use tracing::debug;

use spendwise_core::{
    Adapter, AdapterType, BudgetDefinition, BudgetStore, CostQuery, Filter, GroupRow,
    HealthStatus, SpendwiseError, StorageBackend, TimeRange, UsageEvent,
};

use crate::database::{Database, BACKEND};
use crate::queries;

/// Durable storage in one SQLite file.
///
/// Writes are serialized on the connection's background thread; each write
/// runs in a `BEGIN IMMEDIATE` transaction so readers see all of an event or
/// none of it.
pub struct SqliteStorage {
    db: Database,
    wal_mode: bool,
}

impl SqliteStorage {
    /// Open or create the database at `path` and apply migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, SpendwiseError> {
        let db = Database::open(path, wal_mode).await?;
        Ok(Self { db, wal_mode })
    }

    /// A throwaway in-memory database.
    pub async fn open_in_memory() -> Result<Self, SpendwiseError> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db,
            wal_mode: false,
        })
    }
}

#[async_trait]
impl Adapter for SqliteStorage {
    fn name(&self) -> &str {
        BACKEND
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, SpendwiseError> {
        let probe = self
            .db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await;
        Ok(match probe {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), SpendwiseError> {
        if self.wal_mode {
            self.db.checkpoint().await?;
        }
        debug!("sqlite storage shut down");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn write(&self, event: &UsageEvent) -> Result<(), SpendwiseError> {
        queries::events::insert_event(&self.db, event).await
    }

    async fn query(&self, query: &CostQuery) -> Result<Vec<GroupRow>, SpendwiseError> {
        query.validate()?;
        queries::events::aggregate(&self.db, query).await
    }

    async fn scan(
        &self,
        filters: &[Filter],
        range: &TimeRange,
    ) -> Result<Vec<UsageEvent>, SpendwiseError> {
        spendwise_core::query::validate_filters(filters)?;
        queries::events::scan_events(&self.db, filters, range).await
    }
}

#[async_trait]
impl BudgetStore for SqliteStorage {
    async fn save_budget(&self, budget: &BudgetDefinition) -> Result<(), SpendwiseError> {
        queries::budgets::insert_budget(&self.db, budget).await
    }

    async fn load_budgets(&self) -> Result<Vec<BudgetDefinition>, SpendwiseError> {
        queries::budgets::list_budgets(&self.db).await
    }
}
