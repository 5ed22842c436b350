//! SQLite adapter over an owned `rusqlite` connection.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, params_from_iter};
use tracing::debug;

use crate::core::{Executor, Statement};
use crate::error::{BackendError, RepoError, RepoResult, TransientError};
use crate::types::value::{Row, SqlValue};

const BACKEND: &str = "sqlite";

/// Blocking executor over a SQLite connection.
///
/// Timestamps are stored as RFC 3339 text and booleans as 0/1 integers; the
/// repository normalizes both on decode.
pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    /// Wraps an already-open connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens a database file.
    pub fn open(path: impl AsRef<std::path::Path>) -> RepoResult<Self> {
        let conn = Connection::open(path).map_err(map_error)?;
        Ok(Self::new(conn))
    }

    /// Opens a fresh in-memory database.
    pub fn in_memory() -> RepoResult<Self> {
        let conn = Connection::open_in_memory().map_err(map_error)?;
        Ok(Self::new(conn))
    }

    /// Runs raw DDL, for table setup.
    pub fn execute_batch(&self, sql: &str) -> RepoResult<()> {
        self.conn.execute_batch(sql).map_err(map_error)
    }

    /// Borrows the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn bind_value(value: &SqlValue) -> rusqlite::types::Value {
    use rusqlite::types::Value;
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(n) => Value::Integer(*n),
        SqlValue::Real(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Boolean(b) => Value::Integer(i64::from(*b)),
        SqlValue::Timestamp(dt) => Value::Text(dt.to_rfc3339()),
    }
}

fn read_value(value: ValueRef<'_>) -> RepoResult<SqlValue> {
    match value {
        ValueRef::Null => Ok(SqlValue::Null),
        ValueRef::Integer(n) => Ok(SqlValue::Integer(n)),
        ValueRef::Real(f) => Ok(SqlValue::Real(f)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| SqlValue::Text(s.to_string()))
            .map_err(|e| RepoError::conversion(format!("non-UTF-8 text column: {e}"))),
        ValueRef::Blob(_) => Err(RepoError::conversion(
            "blob columns are not supported".to_string(),
        )),
    }
}

/// Maps a `rusqlite` error onto the toolkit taxonomy.
fn map_error(err: rusqlite::Error) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, ref message) = err {
        match failure.code {
            ErrorCode::ConstraintViolation => {
                let detail = message.clone().unwrap_or_else(|| failure.to_string());
                if detail.contains("UNIQUE") {
                    // "UNIQUE constraint failed: users.id"
                    let constraint = detail
                        .rsplit(": ")
                        .next()
                        .unwrap_or("unique")
                        .to_string();
                    let entity = constraint
                        .split('.')
                        .next()
                        .unwrap_or("unknown")
                        .to_string();
                    return RepoError::Duplicate { entity, constraint };
                }
            }
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                return TransientError::LockTimeout {
                    message: message.clone().unwrap_or_else(|| failure.to_string()),
                }
                .into();
            }
            _ => {}
        }
    }
    BackendError::Query {
        backend_name: BACKEND,
        message: err.to_string(),
        source: Some(Box::new(err)),
    }
    .into()
}

impl Executor for SqliteExecutor {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn execute(&mut self, stmt: &Statement) -> RepoResult<u64> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "execute");
        let affected = self
            .conn
            .execute(&stmt.sql, params_from_iter(stmt.params.iter().map(bind_value)))
            .map_err(map_error)?;
        Ok(affected as u64)
    }

    fn fetch(&mut self, stmt: &Statement) -> RepoResult<Vec<Row>> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "fetch");
        let mut prepared = self.conn.prepare(&stmt.sql).map_err(map_error)?;
        let columns: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = prepared
            .query(params_from_iter(stmt.params.iter().map(bind_value)))
            .map_err(map_error)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_error)? {
            let mut decoded = Row::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                let value = row.get_ref(idx).map_err(map_error)?;
                decoded.insert(name.clone(), read_value(value)?);
            }
            out.push(decoded);
        }
        Ok(out)
    }

    fn begin(&mut self) -> RepoResult<()> {
        self.control("BEGIN")
    }

    fn commit(&mut self) -> RepoResult<()> {
        self.control("COMMIT")
    }

    fn rollback(&mut self) -> RepoResult<()> {
        self.control("ROLLBACK")
    }
}

impl SqliteExecutor {
    fn control(&mut self, sql: &str) -> RepoResult<()> {
        self.conn.execute_batch(sql).map_err(|err| {
            BackendError::TransactionControl {
                backend_name: BACKEND,
                message: err.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> SqliteExecutor {
        let exec = SqliteExecutor::in_memory().unwrap();
        exec.execute_batch(
            "CREATE TABLE items (id TEXT PRIMARY KEY, label TEXT, qty INTEGER)",
        )
        .unwrap();
        exec
    }

    fn insert(exec: &mut SqliteExecutor, id: &str, label: &str, qty: i64) -> RepoResult<u64> {
        exec.execute(&Statement::new(
            "INSERT INTO items (id, label, qty) VALUES (?, ?, ?)",
            vec![id.into(), label.into(), qty.into()],
        ))
    }

    #[test]
    fn test_execute_and_fetch() {
        let mut exec = executor();
        assert_eq!(insert(&mut exec, "a", "apple", 3).unwrap(), 1);

        let rows = exec
            .fetch(&Statement::new(
                "SELECT id, label, qty FROM items WHERE qty > ?",
                vec![SqlValue::Integer(1)],
            ))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("label"), Some(&SqlValue::Text("apple".into())));
        assert_eq!(rows[0].get("qty"), Some(&SqlValue::Integer(3)));
    }

    #[test]
    fn test_unique_violation_maps_to_duplicate() {
        let mut exec = executor();
        insert(&mut exec, "a", "apple", 1).unwrap();
        let err = insert(&mut exec, "a", "apple", 1).unwrap_err();
        match err {
            RepoError::Duplicate { constraint, .. } => {
                assert!(constraint.contains("items.id"), "constraint: {constraint}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut exec = executor();
        exec.begin().unwrap();
        insert(&mut exec, "a", "apple", 1).unwrap();
        exec.rollback().unwrap();

        let rows = exec
            .fetch(&Statement::new("SELECT id FROM items", vec![]))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_null_roundtrip() {
        let mut exec = executor();
        exec.execute(&Statement::new(
            "INSERT INTO items (id, label, qty) VALUES (?, ?, ?)",
            vec!["a".into(), SqlValue::Null, SqlValue::Null],
        ))
        .unwrap();
        let rows = exec
            .fetch(&Statement::new("SELECT label FROM items", vec![]))
            .unwrap();
        assert_eq!(rows[0].get("label"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_approximate_count_unsupported() {
        let mut exec = executor();
        assert_eq!(exec.approximate_row_count("items").unwrap(), None);
    }
}
