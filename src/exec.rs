//! Executor collaborator boundary.
//!
//! The engine renders statement text; running it is someone else's job.
//! This module defines that contract and ships a read-only SQLite
//! implementation for embedded use and tests.

use crate::error::ExecutionError;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Json>>,
}

/// Runs rendered statements under a timeout. Implementations own the
/// connection and its credentials; the engine never sees either.
pub trait Executor {
    fn query(&self, statement: &str, timeout: Duration) -> Result<ResultSet, ExecutionError>;
    fn count(&self, statement: &str, timeout: Duration) -> Result<u64, ExecutionError>;
}

/// Reference executor over a read-only SQLite handle. The timeout bounds
/// lock waits via the engine's busy handler.
pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| ExecutionError::ConnectionLost(e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    fn map_err(e: rusqlite::Error, timeout: Duration) -> ExecutionError {
        let message = e.to_string();
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("locked") || lowered.contains("busy") {
            ExecutionError::Timeout(timeout)
        } else if lowered.contains("readonly") || lowered.contains("authoriz") {
            ExecutionError::PermissionDenied(message)
        } else {
            ExecutionError::ConnectionLost(message)
        }
    }
}

impl Executor for SqliteExecutor {
    fn query(&self, statement: &str, timeout: Duration) -> Result<ResultSet, ExecutionError> {
        self.conn
            .busy_timeout(timeout)
            .map_err(|e| Self::map_err(e, timeout))?;
        let mut stmt = self
            .conn
            .prepare(statement)
            .map_err(|e| Self::map_err(e, timeout))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();
        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(json_value(row.get_ref(i)?));
                }
                Ok(values)
            })
            .map_err(|e| Self::map_err(e, timeout))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Self::map_err(e, timeout))?;
        Ok(ResultSet { columns, rows })
    }

    fn count(&self, statement: &str, timeout: Duration) -> Result<u64, ExecutionError> {
        self.conn
            .busy_timeout(timeout)
            .map_err(|e| Self::map_err(e, timeout))?;
        let value: i64 = self
            .conn
            .query_row(statement, [], |row| row.get(0))
            .map_err(|e| Self::map_err(e, timeout))?;
        Ok(value.max(0) as u64)
    }
}

fn json_value(value: ValueRef<'_>) -> Json {
    match value {
        ValueRef::Null => Json::Null,
        ValueRef::Integer(i) => Json::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        ValueRef::Text(t) => Json::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Json::String(format!("<blob {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> SqliteExecutor {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE customers (customer_id INTEGER PRIMARY KEY, name TEXT, score REAL);
             INSERT INTO customers VALUES (1, 'Ada', 9.5), (2, 'Grace', NULL);",
        )
        .unwrap();
        SqliteExecutor::from_connection(conn)
    }

    #[test]
    fn test_query_maps_values_to_json() {
        let executor = fixture();
        let result = executor
            .query("SELECT * FROM customers ORDER BY customer_id", Duration::from_secs(1))
            .unwrap();
        assert_eq!(result.columns, vec!["customer_id", "name", "score"]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0][1], Json::String("Ada".to_string()));
        assert_eq!(result.rows[1][2], Json::Null);
    }

    #[test]
    fn test_count() {
        let executor = fixture();
        let count = executor
            .count("SELECT COUNT(*) FROM customers", Duration::from_secs(1))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_bad_statement_is_connection_error() {
        let executor = fixture();
        let err = executor
            .query("SELECT * FROM nothing_here", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::ConnectionLost(_)));
    }
}
