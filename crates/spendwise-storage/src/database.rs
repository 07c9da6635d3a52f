// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite connection management: PRAGMA setup, migrations, and close.
//!
//! All statements run on tokio-rusqlite's single background thread, which
//! makes that thread the one writer for the file. Do not open a second
//! `Connection` for writes.

use std::path::Path;

use spendwise_core::SpendwiseError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

pub(crate) const BACKEND: &str = "sqlite";

/// A migrated, configured SQLite database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database file at `path`.
    ///
    /// Parent directories are created. With `wal_mode`, readers never block
    /// the writer.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, SpendwiseError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SpendwiseError::unavailable(BACKEND, e))?;
            }
        }
        let conn = Connection::open(path)
            .await
            .map_err(|e| SpendwiseError::unavailable(BACKEND, e))?;
        let db = Self::configure(conn, wal_mode).await?;
        debug!(path, wal_mode, "sqlite database opened");
        Ok(db)
    }

    /// Open a private in-memory database. Used by tests.
    pub async fn open_in_memory() -> Result<Self, SpendwiseError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| SpendwiseError::unavailable(BACKEND, e))?;
        Self::configure(conn, false).await
    }

    async fn configure(conn: Connection, wal_mode: bool) -> Result<Self, SpendwiseError> {
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal_mode {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            conn.execute_batch(
                "PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| migrations::run_migrations(conn))
            .await
            .map_err(map_tr_err)?;

        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Fold the WAL back into the main file.
    pub async fn checkpoint(&self) -> Result<(), SpendwiseError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Convert a tokio-rusqlite call error into a storage error.
///
/// A closed connection, or SQLite failing to open, lock, or read the file,
/// means the backend is unavailable rather than the statement being wrong.
pub(crate) fn map_tr_err<E>(e: tokio_rusqlite::Error<E>) -> SpendwiseError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let unavailable = match &e {
        tokio_rusqlite::Error::ConnectionClosed | tokio_rusqlite::Error::Close(_) => true,
        tokio_rusqlite::Error::Error(inner) => {
            let inner: &(dyn std::error::Error + 'static) = inner;
            inner
                .downcast_ref::<rusqlite::Error>()
                .is_some_and(is_unavailable_code)
        }
        _ => false,
    };
    if unavailable {
        SpendwiseError::unavailable(BACKEND, e)
    } else {
        SpendwiseError::storage(e)
    }
}

fn is_unavailable_code(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(
            rusqlite::ErrorCode::CannotOpen
                | rusqlite::ErrorCode::DatabaseBusy
                | rusqlite::ErrorCode::SystemIoFailure
        )
    )
}
