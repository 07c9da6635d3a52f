// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only budget definition history.

use chrono::{DateTime, Utc};
use rusqlite::params;
use rusqlite::types::Type;
use spendwise_core::query::scope_key;
use spendwise_core::{BudgetDefinition, Cost, Filter, SpendwiseError};

use crate::database::{map_tr_err, Database};

/// Append a budget definition. Earlier rows for the same slot are kept.
pub async fn insert_budget(db: &Database, budget: &BudgetDefinition) -> Result<(), SpendwiseError> {
    let id = budget.id.clone();
    let amount = budget.amount.nanos();
    let period = budget.period.to_string();
    let scope_key = scope_key(&budget.scope);
    let scope = serde_json::to_string(&budget.scope).map_err(SpendwiseError::storage)?;
    let created_at = budget.created_at.timestamp_micros();

    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO budget_definitions \
                 (id, amount_nanos, period, scope_key, scope, created_at_us) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, amount, period, scope_key, scope, created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Every stored definition, oldest first.
pub async fn list_budgets(db: &Database) -> Result<Vec<BudgetDefinition>, SpendwiseError> {
    db.connection()
        .call(|conn| -> Result<Vec<BudgetDefinition>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, amount_nanos, period, scope, created_at_us \
                 FROM budget_definitions ORDER BY created_at_us ASC, seq ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let period: String = row.get(2)?;
                    let period = period.parse().map_err(|e: strum::ParseError| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                    })?;
                    let scope: String = row.get(3)?;
                    let scope: Vec<Filter> = serde_json::from_str(&scope).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                    })?;
                    let created_us: i64 = row.get(4)?;
                    let created_at = DateTime::<Utc>::from_timestamp_micros(created_us)
                        .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, created_us))?;
                    Ok(BudgetDefinition {
                        id: row.get(0)?,
                        amount: Cost::from_nanos(row.get(1)?),
                        period,
                        scope,
                        created_at,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}
