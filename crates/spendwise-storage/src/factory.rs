// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build the configured backend.

use std::sync::Arc;

use spendwise_config::model::{StorageConfig, StorageKind};
use spendwise_core::{BudgetStore, SpendwiseError, StorageBackend};
use tracing::info;

use crate::memory::MemoryStorage;
use crate::sqlite::SqliteStorage;

/// One backend viewed through both of its roles.
#[derive(Clone)]
pub struct Backend {
    pub storage: Arc<dyn StorageBackend>,
    pub budgets: Arc<dyn BudgetStore>,
}

impl Backend {
    /// Share a single value as both the event store and the budget store.
    pub fn from_shared<T>(backend: T) -> Self
    where
        T: StorageBackend + BudgetStore,
    {
        let backend = Arc::new(backend);
        Self {
            storage: backend.clone(),
            budgets: backend,
        }
    }
}

/// Open the backend selected by `config.backend`.
pub async fn open_backend(config: &StorageConfig) -> Result<Backend, SpendwiseError> {
    let backend = match config.backend {
        StorageKind::Memory => Backend::from_shared(MemoryStorage::new()),
        StorageKind::Sqlite => Backend::from_shared(
            SqliteStorage::open(&config.database_path, config.wal_mode).await?,
        ),
        StorageKind::Postgres => open_postgres(config).await?,
    };
    info!(backend = backend.storage.name(), "storage backend ready");
    Ok(backend)
}

#[cfg(feature = "postgres")]
async fn open_postgres(config: &StorageConfig) -> Result<Backend, SpendwiseError> {
    use std::time::Duration;

    use crate::postgres::{PostgresOptions, PostgresStorage};

    let url = config.database_url.as_deref().ok_or_else(|| {
        SpendwiseError::Config("storage.database_url is required for postgres".into())
    })?;
    let options = PostgresOptions {
        max_connections: config.max_connections,
        connect_timeout: Duration::from_secs(config.connect_timeout_secs),
    };
    Ok(Backend::from_shared(
        PostgresStorage::connect(url, options).await?,
    ))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_config: &StorageConfig) -> Result<Backend, SpendwiseError> {
    Err(SpendwiseError::Config(
        "postgres backend requires building spendwise-storage with the `postgres` feature".into(),
    ))
}
