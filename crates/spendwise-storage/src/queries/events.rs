// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage event writes, grouped aggregation, and time-ordered scans.

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, TransactionBehavior};
use spendwise_core::{
    Cost, CostQuery, Dimension, Filter, GroupKey, GroupRow, Labels, SpendwiseError, TimeRange,
    UsageEvent,
};

use crate::database::{map_tr_err, Database};

/// Insert one event and its label rows in a single `IMMEDIATE` transaction.
pub async fn insert_event(db: &Database, event: &UsageEvent) -> Result<(), SpendwiseError> {
    let event = event.clone();
    let labels_json = serde_json::to_string(&event.labels).map_err(SpendwiseError::storage)?;
    let input_tokens = to_i64(event.input_tokens)?;
    let output_tokens = to_i64(event.output_tokens)?;

    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO usage_events \
                 (id, ts_us, model, input_tokens, output_tokens, cost_nanos, labels) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.id,
                    event.timestamp.timestamp_micros(),
                    event.model,
                    input_tokens,
                    output_tokens,
                    event.cost.nanos(),
                    labels_json,
                ],
            )?;
            let seq = tx.last_insert_rowid();
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO event_labels (event_seq, key, value) VALUES (?1, ?2, ?3)",
                )?;
                for (key, value) in &event.labels {
                    stmt.execute(params![seq, key, value])?;
                }
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// Run a grouped aggregation as one `SELECT`, which SQLite evaluates against
/// a single read snapshot.
pub async fn aggregate(db: &Database, query: &CostQuery) -> Result<Vec<GroupRow>, SpendwiseError> {
    let (sql, values) = build_aggregate_sql(query);
    let dims = query.group_by.len();

    db.connection()
        .call(move |conn| -> Result<Vec<GroupRow>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), |row| {
                    let mut key = Vec::with_capacity(dims);
                    for i in 0..dims {
                        key.push(row.get::<_, Option<String>>(i)?);
                    }
                    let count: i64 = row.get(dims)?;
                    let cost: Option<i64> = row.get(dims + 1)?;
                    let tokens: Option<i64> = row.get(dims + 2)?;
                    Ok(GroupRow {
                        key: GroupKey(key),
                        count: count.max(0) as u64,
                        total_cost: Cost::from_nanos(cost.unwrap_or(0)),
                        total_tokens: tokens.unwrap_or(0).max(0) as u64,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            // Without GROUP BY an empty match still yields one all-zero row.
            Ok(rows.into_iter().filter(|r| r.count > 0).collect())
        })
        .await
        .map_err(map_tr_err)
}

/// Events matching `filters` inside `range`, ordered by timestamp then id.
pub async fn scan_events(
    db: &Database,
    filters: &[Filter],
    range: &TimeRange,
) -> Result<Vec<UsageEvent>, SpendwiseError> {
    let mut values = vec![
        Value::Integer(range.start.timestamp_micros()),
        Value::Integer(range.end.timestamp_micros()),
    ];
    let mut sql = String::from(
        "SELECT e.id, e.ts_us, e.model, e.input_tokens, e.output_tokens, e.cost_nanos, e.labels \
         FROM usage_events e WHERE e.ts_us >= ?1 AND e.ts_us < ?2",
    );
    push_filters(&mut sql, &mut values, filters);
    sql.push_str(" ORDER BY e.ts_us ASC, e.id ASC");

    db.connection()
        .call(move |conn| -> Result<Vec<UsageEvent>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let events = stmt
                .query_map(params_from_iter(values.iter()), |row| {
                    let ts_us: i64 = row.get(1)?;
                    let timestamp = DateTime::<Utc>::from_timestamp_micros(ts_us).ok_or_else(
                        || rusqlite::Error::IntegralValueOutOfRange(1, ts_us),
                    )?;
                    let labels_json: String = row.get(6)?;
                    let labels: Labels = serde_json::from_str(&labels_json).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e))
                    })?;
                    Ok(UsageEvent {
                        id: row.get(0)?,
                        timestamp,
                        model: row.get(2)?,
                        input_tokens: row.get::<_, i64>(3)?.max(0) as u64,
                        output_tokens: row.get::<_, i64>(4)?.max(0) as u64,
                        cost: Cost::from_nanos(row.get(5)?),
                        labels,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

/// Build the aggregation statement and its positional parameters.
///
/// Each grouped label becomes a correlated subquery that yields `NULL` for
/// events without the label. SQLite sorts `NULL` first and compares `TEXT`
/// bytewise, which matches [`GroupKey`] ordering.
pub(crate) fn build_aggregate_sql(query: &CostQuery) -> (String, Vec<Value>) {
    let mut values = vec![
        Value::Integer(query.range.start.timestamp_micros()),
        Value::Integer(query.range.end.timestamp_micros()),
    ];
    let mut columns = Vec::with_capacity(query.group_by.len());
    for (i, dimension) in query.group_by.iter().enumerate() {
        let expr = match dimension {
            Dimension::Model => "e.model".to_string(),
            Dimension::Label(key) => {
                values.push(Value::Text(key.clone()));
                format!(
                    "(SELECT l.value FROM event_labels l WHERE l.event_seq = e.seq AND l.key = ?{})",
                    values.len()
                )
            }
        };
        columns.push(format!("{expr} AS d{i}"));
    }

    let mut sql = String::from("SELECT ");
    for column in &columns {
        sql.push_str(column);
        sql.push_str(", ");
    }
    sql.push_str(
        "COUNT(*), SUM(e.cost_nanos), SUM(e.input_tokens + e.output_tokens) \
         FROM usage_events e WHERE e.ts_us >= ?1 AND e.ts_us < ?2",
    );
    push_filters(&mut sql, &mut values, &query.filters);

    if !columns.is_empty() {
        let ordinals: Vec<String> = (0..columns.len()).map(|i| format!("d{i}")).collect();
        let ordinals = ordinals.join(", ");
        sql.push_str(&format!(" GROUP BY {ordinals} ORDER BY {ordinals}"));
    }
    (sql, values)
}

fn push_filters(sql: &mut String, values: &mut Vec<Value>, filters: &[Filter]) {
    for filter in filters {
        match &filter.dimension {
            Dimension::Model => {
                values.push(Value::Text(filter.value.clone()));
                sql.push_str(&format!(" AND e.model = ?{}", values.len()));
            }
            Dimension::Label(key) => {
                values.push(Value::Text(key.clone()));
                let key_idx = values.len();
                values.push(Value::Text(filter.value.clone()));
                let value_idx = values.len();
                sql.push_str(&format!(
                    " AND EXISTS (SELECT 1 FROM event_labels f WHERE f.event_seq = e.seq \
                     AND f.key = ?{key_idx} AND f.value = ?{value_idx})"
                ));
            }
        }
    }
}

fn to_i64(tokens: u64) -> Result<i64, SpendwiseError> {
    i64::try_from(tokens)
        .map_err(|_| SpendwiseError::InvalidQuery(format!("token count {tokens} out of range")))
}
