//! The I/O capability seam between the repository core and the drivers.
//!
//! All repository, pagination, and transaction semantics are written once
//! against these traits; the adapters in [`crate::backends`] translate the
//! small execute/fetch/commit/rollback surface to a concrete driver. The
//! blocking and async variants are deliberately identical in shape so the
//! two repository frontends stay thin.

use async_trait::async_trait;

use crate::error::RepoResult;
use crate::types::value::{Row, SqlValue};

/// A planned statement: SQL with `?` placeholders and its bound parameters.
#[derive(Debug, Clone)]
pub struct Statement {
    /// SQL text. Placeholders are `?`; adapters rewrite as needed.
    pub sql: String,
    /// Bound values, one per placeholder.
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Creates a statement.
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Blocking I/O capability over one open connection.
///
/// The connection is owned and lifecycle-managed by the caller; the toolkit
/// only borrows it for the duration of each operation. Implementations map
/// driver errors onto the toolkit taxonomy (duplicates, transient failures,
/// backend errors).
pub trait Executor {
    /// A human-readable driver name, used in error messages and logs.
    fn backend_name(&self) -> &'static str;

    /// Executes a statement, returning the number of affected rows.
    fn execute(&mut self, stmt: &Statement) -> RepoResult<u64>;

    /// Executes a query, returning all matching rows.
    fn fetch(&mut self, stmt: &Statement) -> RepoResult<Vec<Row>>;

    /// Begins a transaction.
    fn begin(&mut self) -> RepoResult<()>;

    /// Commits the current transaction.
    fn commit(&mut self) -> RepoResult<()>;

    /// Rolls back the current transaction.
    fn rollback(&mut self) -> RepoResult<()>;

    /// Returns an approximate row count for `table` from store statistics,
    /// or `None` when the store keeps none. Used by offset pagination to
    /// trade exactness for latency on large tables.
    fn approximate_row_count(&mut self, table: &str) -> RepoResult<Option<u64>> {
        let _ = table;
        Ok(None)
    }
}

/// Async I/O capability over one open connection.
///
/// Mirrors [`Executor`]; operations suspend only at query execution, commit,
/// and rollback boundaries. No background tasks are spawned.
#[async_trait]
pub trait AsyncExecutor: Send {
    /// A human-readable driver name, used in error messages and logs.
    fn backend_name(&self) -> &'static str;

    /// Executes a statement, returning the number of affected rows.
    async fn execute(&mut self, stmt: &Statement) -> RepoResult<u64>;

    /// Executes a query, returning all matching rows.
    async fn fetch(&mut self, stmt: &Statement) -> RepoResult<Vec<Row>>;

    /// Begins a transaction.
    async fn begin(&mut self) -> RepoResult<()>;

    /// Commits the current transaction.
    async fn commit(&mut self) -> RepoResult<()>;

    /// Rolls back the current transaction.
    async fn rollback(&mut self) -> RepoResult<()>;

    /// Returns an approximate row count for `table` from store statistics,
    /// or `None` when the store keeps none.
    async fn approximate_row_count(&mut self, table: &str) -> RepoResult<Option<u64>> {
        let _ = table;
        Ok(None)
    }
}
