// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! DuckDB connection helpers shared by the loader, merge and query paths.

use duckdb::{AccessMode, Config, Connection};
use std::path::Path;

use crate::error::{Error, Result};

/// Open (creating if needed) a store for writing.
pub fn open_read_write(path: &Path) -> Result<Connection> {
    Ok(Connection::open(path)?)
}

/// Open an existing store read-only.
pub fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(Error::StoreNotFound(path.to_path_buf()));
    }
    let config = Config::default().access_mode(AccessMode::ReadOnly)?;
    Ok(Connection::open_with_flags(path, config)?)
}

/// Run `body` between `BEGIN TRANSACTION` and `COMMIT`, rolling back on error.
///
/// Explicit statements are used instead of `Connection::transaction` so the
/// body can run against a shared `&Connection` with databases attached.
pub fn in_transaction<T>(conn: &Connection, body: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    conn.execute_batch("BEGIN TRANSACTION")?;
    match body(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Quote an identifier for DuckDB.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for DuckDB. Only used for file paths, which
/// table functions and `ATTACH` do not accept as bound parameters.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a filesystem path as a DuckDB string literal.
pub fn quote_path(path: &Path) -> String {
    quote_literal(&path.to_string_lossy())
}

/// Number of rows in `trips` of the given schema (`main` or an attached alias).
pub fn count_trips(conn: &Connection, schema: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}.{}", schema, crate::schema::TRIPS_TABLE);
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or_default())
}
