// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Networked PostgreSQL backend (multi-writer).
//!
//! Every statement is a single `INSERT` or `SELECT`, so Postgres' native
//! atomic insert and per-statement snapshot give the storage contract
//! without explicit locking.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::debug;

use spendwise_core::query::{scope_key, validate_filters};
use spendwise_core::{
    Adapter, AdapterType, BudgetDefinition, BudgetStore, Cost, CostQuery, Dimension, Filter,
    GroupKey, GroupRow, HealthStatus, Labels, SpendwiseError, StorageBackend, TimeRange,
    UsageEvent,
};

const BACKEND: &str = "postgres";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS usage_events (
        id            TEXT        PRIMARY KEY,
        ts            TIMESTAMPTZ NOT NULL,
        model         TEXT        NOT NULL,
        input_tokens  BIGINT      NOT NULL CHECK (input_tokens >= 0),
        output_tokens BIGINT      NOT NULL CHECK (output_tokens >= 0),
        cost_nanos    BIGINT      NOT NULL,
        labels        JSONB       NOT NULL DEFAULT '{}'::jsonb
    )",
    "CREATE INDEX IF NOT EXISTS idx_usage_events_ts ON usage_events (ts)",
    "CREATE INDEX IF NOT EXISTS idx_usage_events_labels ON usage_events USING GIN (labels)",
    "CREATE TABLE IF NOT EXISTS budget_definitions (
        seq          BIGSERIAL   PRIMARY KEY,
        id           TEXT        NOT NULL UNIQUE,
        amount_nanos BIGINT      NOT NULL CHECK (amount_nanos > 0),
        period       TEXT        NOT NULL,
        scope_key    TEXT        NOT NULL,
        scope        JSONB       NOT NULL,
        created_at   TIMESTAMPTZ NOT NULL
    )",
];

/// Pool settings for [`PostgresStorage::connect`].
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// PostgreSQL storage over a `sqlx` connection pool.
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect and create the schema if it is missing.
    pub async fn connect(url: &str, options: PostgresOptions) -> Result<Self, SpendwiseError> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.connect_timeout)
            .connect(url)
            .await
            .map_err(|e| SpendwiseError::unavailable(BACKEND, e))?;

        let mut tx = pool.begin().await.map_err(map_sqlx_err)?;
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        }
        tx.commit().await.map_err(map_sqlx_err)?;

        debug!(max_connections = options.max_connections, "postgres storage connected");
        Ok(Self { pool })
    }
}

#[async_trait]
impl Adapter for PostgresStorage {
    fn name(&self) -> &str {
        BACKEND
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, SpendwiseError> {
        Ok(match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), SpendwiseError> {
        self.pool.close().await;
        debug!("postgres pool closed");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for PostgresStorage {
    async fn write(&self, event: &UsageEvent) -> Result<(), SpendwiseError> {
        sqlx::query(
            "INSERT INTO usage_events \
             (id, ts, model, input_tokens, output_tokens, cost_nanos, labels) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&event.id)
        .bind(event.timestamp)
        .bind(&event.model)
        .bind(tokens_to_i64(event.input_tokens)?)
        .bind(tokens_to_i64(event.output_tokens)?)
        .bind(event.cost.nanos())
        .bind(Json(&event.labels))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn query(&self, query: &CostQuery) -> Result<Vec<GroupRow>, SpendwiseError> {
        query.validate()?;
        let mut builder = aggregate_builder(query);
        let dims = query.group_by.len();

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        rows.iter()
            .map(|row| group_row(row, dims))
            .filter(|row| !matches!(row, Ok(r) if r.count == 0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlx_err)
    }

    async fn scan(
        &self,
        filters: &[Filter],
        range: &TimeRange,
    ) -> Result<Vec<UsageEvent>, SpendwiseError> {
        validate_filters(filters)?;
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, ts, model, input_tokens, output_tokens, cost_nanos, labels \
             FROM usage_events WHERE ts >= ",
        );
        builder.push_bind(range.start).push(" AND ts < ").push_bind(range.end);
        push_filters(&mut builder, filters);
        builder.push(" ORDER BY ts ASC, id COLLATE \"C\" ASC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        rows.iter()
            .map(event_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlx_err)
    }
}

#[async_trait]
impl BudgetStore for PostgresStorage {
    async fn save_budget(&self, budget: &BudgetDefinition) -> Result<(), SpendwiseError> {
        sqlx::query(
            "INSERT INTO budget_definitions \
             (id, amount_nanos, period, scope_key, scope, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&budget.id)
        .bind(budget.amount.nanos())
        .bind(budget.period.to_string())
        .bind(scope_key(&budget.scope))
        .bind(Json(&budget.scope))
        .bind(budget.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn load_budgets(&self) -> Result<Vec<BudgetDefinition>, SpendwiseError> {
        let rows = sqlx::query(
            "SELECT id, amount_nanos, period, scope, created_at \
             FROM budget_definitions ORDER BY created_at ASC, seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.iter()
            .map(|row| {
                let period: String = row.try_get("period").map_err(map_sqlx_err)?;
                let scope: Json<Vec<Filter>> = row.try_get("scope").map_err(map_sqlx_err)?;
                Ok(BudgetDefinition {
                    id: row.try_get("id").map_err(map_sqlx_err)?,
                    amount: Cost::from_nanos(row.try_get("amount_nanos").map_err(map_sqlx_err)?),
                    period: period.parse().map_err(SpendwiseError::storage)?,
                    scope: scope.0,
                    created_at: row.try_get("created_at").map_err(map_sqlx_err)?,
                })
            })
            .collect()
    }
}

/// Grouped aggregation with `NULL` (missing label) keys first and bytewise
/// (`"C"`) collation, matching [`GroupKey`] ordering.
fn aggregate_builder(query: &CostQuery) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
    for (i, dimension) in query.group_by.iter().enumerate() {
        match dimension {
            Dimension::Model => {
                builder.push("model COLLATE \"C\"");
            }
            Dimension::Label(key) => {
                builder.push("(labels ->> ").push_bind(key.as_str()).push(") COLLATE \"C\"");
            }
        }
        builder.push(format!(" AS d{i}, "));
    }
    builder.push(
        "COUNT(*) AS event_count, \
         COALESCE(SUM(cost_nanos), 0)::BIGINT AS total_cost, \
         COALESCE(SUM(input_tokens + output_tokens), 0)::BIGINT AS total_tokens \
         FROM usage_events WHERE ts >= ",
    );
    builder
        .push_bind(query.range.start)
        .push(" AND ts < ")
        .push_bind(query.range.end);
    push_filters(&mut builder, &query.filters);

    if !query.group_by.is_empty() {
        let ordinals: Vec<String> = (1..=query.group_by.len()).map(|i| i.to_string()).collect();
        let ordinals = ordinals.join(", ");
        builder.push(format!(" GROUP BY {ordinals} ORDER BY "));
        let order: Vec<String> = (1..=query.group_by.len())
            .map(|i| format!("{i} ASC NULLS FIRST"))
            .collect();
        builder.push(order.join(", "));
    }
    builder
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, filters: &'a [Filter]) {
    for filter in filters {
        match &filter.dimension {
            Dimension::Model => {
                builder.push(" AND model = ").push_bind(filter.value.as_str());
            }
            Dimension::Label(key) => {
                builder
                    .push(" AND labels ->> ")
                    .push_bind(key.as_str())
                    .push(" = ")
                    .push_bind(filter.value.as_str());
            }
        }
    }
}

fn group_row(row: &PgRow, dims: usize) -> Result<GroupRow, sqlx::Error> {
    let mut key = Vec::with_capacity(dims);
    for i in 0..dims {
        key.push(row.try_get::<Option<String>, _>(i)?);
    }
    let count: i64 = row.try_get("event_count")?;
    let cost: i64 = row.try_get("total_cost")?;
    let tokens: i64 = row.try_get("total_tokens")?;
    Ok(GroupRow {
        key: GroupKey(key),
        count: count.max(0) as u64,
        total_cost: Cost::from_nanos(cost),
        total_tokens: tokens.max(0) as u64,
    })
}

fn event_row(row: &PgRow) -> Result<UsageEvent, sqlx::Error> {
    let timestamp: DateTime<Utc> = row.try_get("ts")?;
    let labels: Json<Labels> = row.try_get("labels")?;
    Ok(UsageEvent {
        id: row.try_get("id")?,
        timestamp,
        model: row.try_get("model")?,
        input_tokens: row.try_get::<i64, _>("input_tokens")?.max(0) as u64,
        output_tokens: row.try_get::<i64, _>("output_tokens")?.max(0) as u64,
        cost: Cost::from_nanos(row.try_get("cost_nanos")?),
        labels: labels.0,
    })
}

fn tokens_to_i64(tokens: u64) -> Result<i64, SpendwiseError> {
    i64::try_from(tokens)
        .map_err(|_| SpendwiseError::InvalidQuery(format!("token count {tokens} out of range")))
}

/// Connectivity failures become `StorageUnavailable`; everything else is a
/// plain storage error.
fn map_sqlx_err(e: sqlx::Error) -> SpendwiseError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => SpendwiseError::unavailable(BACKEND, e),
        other => SpendwiseError::storage(other),
    }
}
