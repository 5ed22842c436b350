//! PostgreSQL adapter over a `tokio_postgres` client.

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::Client;
use tracing::debug;

use crate::core::{AsyncExecutor, Statement};
use crate::error::{BackendError, RepoError, RepoResult, TransientError};
use crate::types::value::{Row, SqlValue};

const BACKEND: &str = "postgres";

/// Async executor over a PostgreSQL client.
///
/// Statements are planned with `?` placeholders; this adapter rewrites them
/// to the `$n` form the wire protocol requires.
pub struct PostgresExecutor {
    client: Client,
}

impl PostgresExecutor {
    /// Wraps an already-connected client. The caller drives the connection
    /// task as usual for `tokio_postgres`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Borrows the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn control(&mut self, sql: &str) -> RepoResult<()> {
        self.client.batch_execute(sql).await.map_err(|err| {
            BackendError::TransactionControl {
                backend_name: BACKEND,
                message: err.to_string(),
            }
            .into()
        })
    }
}

/// Rewrites `?` placeholders to `$1..$n`.
///
/// The planner never emits `?` inside literals, so a plain scan suffices.
fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Wire encoding for [`SqlValue`].
///
/// NULL binds as NULL whatever the column type, which matters because the
/// planner cannot see column types at bind time.
#[derive(Debug)]
struct PgValue<'a>(&'a SqlValue);

impl ToSql for PgValue<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Integer(n) => n.to_sql(ty, out),
            SqlValue::Real(f) => f.to_sql(ty, out),
            SqlValue::Text(s) => s.to_sql(ty, out),
            SqlValue::Boolean(b) => b.to_sql(ty, out),
            SqlValue::Timestamp(dt) => dt.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn bind_params(params: &[SqlValue]) -> Vec<PgValue<'_>> {
    params.iter().map(PgValue).collect()
}

fn param_refs<'a>(bound: &'a [PgValue<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn read_column(row: &tokio_postgres::Row, idx: usize) -> RepoResult<SqlValue> {
    let ty = row.columns()[idx].type_();
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .map(|v| v.map(SqlValue::Boolean))
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .map(|v| v.map(|n| SqlValue::Integer(n as i64)))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .map(|v| v.map(|n| SqlValue::Integer(n as i64)))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)
            .map(|v| v.map(SqlValue::Integer))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .map(|v| v.map(|f| SqlValue::Real(f as f64)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .map(|v| v.map(SqlValue::Real))
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        row.try_get::<_, Option<String>>(idx)
            .map(|v| v.map(SqlValue::Text))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(idx)
            .map(|v| v.map(SqlValue::Timestamp))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map(|v| v.map(|dt| SqlValue::Timestamp(dt.and_utc())))
    } else {
        return Err(RepoError::conversion(format!(
            "unsupported column type {ty} for column '{}'",
            row.columns()[idx].name()
        )));
    };
    value
        .map(|v| v.unwrap_or(SqlValue::Null))
        .map_err(|e| RepoError::conversion(e.to_string()))
}

/// Maps a `tokio_postgres` error onto the toolkit taxonomy.
fn map_error(err: tokio_postgres::Error) -> RepoError {
    if let Some(db) = err.as_db_error() {
        let code = db.code();
        if *code == SqlState::UNIQUE_VIOLATION {
            return RepoError::Duplicate {
                entity: db.table().unwrap_or("unknown").to_string(),
                constraint: db.constraint().unwrap_or("unique").to_string(),
            };
        }
        if *code == SqlState::T_R_SERIALIZATION_FAILURE {
            return TransientError::SerializationConflict {
                message: db.message().to_string(),
            }
            .into();
        }
        if *code == SqlState::T_R_DEADLOCK_DETECTED {
            return TransientError::Deadlock {
                message: db.message().to_string(),
            }
            .into();
        }
        if *code == SqlState::LOCK_NOT_AVAILABLE {
            return TransientError::LockTimeout {
                message: db.message().to_string(),
            }
            .into();
        }
    }
    if err.is_closed() {
        return TransientError::ConnectionLost {
            message: err.to_string(),
        }
        .into();
    }
    BackendError::Query {
        backend_name: BACKEND,
        message: err.to_string(),
        source: Some(Box::new(err)),
    }
    .into()
}

#[async_trait]
impl AsyncExecutor for PostgresExecutor {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn execute(&mut self, stmt: &Statement) -> RepoResult<u64> {
        let sql = numbered_placeholders(&stmt.sql);
        debug!(sql = %sql, params = stmt.params.len(), "execute");
        let bound = bind_params(&stmt.params);
        self.client
            .execute(&sql, &param_refs(&bound))
            .await
            .map_err(map_error)
    }

    async fn fetch(&mut self, stmt: &Statement) -> RepoResult<Vec<Row>> {
        let sql = numbered_placeholders(&stmt.sql);
        debug!(sql = %sql, params = stmt.params.len(), "fetch");
        let bound = bind_params(&stmt.params);
        let rows = self
            .client
            .query(&sql, &param_refs(&bound))
            .await
            .map_err(map_error)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut decoded = Row::with_capacity(row.columns().len());
            for idx in 0..row.columns().len() {
                decoded.insert(row.columns()[idx].name().to_string(), read_column(row, idx)?);
            }
            out.push(decoded);
        }
        Ok(out)
    }

    async fn begin(&mut self) -> RepoResult<()> {
        self.control("BEGIN").await
    }

    async fn commit(&mut self) -> RepoResult<()> {
        self.control("COMMIT").await
    }

    async fn rollback(&mut self) -> RepoResult<()> {
        self.control("ROLLBACK").await
    }

    /// Planner statistics from `pg_class`; `-1` means never analyzed.
    async fn approximate_row_count(&mut self, table: &str) -> RepoResult<Option<u64>> {
        let rows = self
            .client
            .query(
                "SELECT reltuples::BIGINT FROM pg_class WHERE relname = $1",
                &[&table],
            )
            .await
            .map_err(map_error)?;
        let estimate: Option<i64> = rows.first().map(|row| row.get(0));
        Ok(estimate.filter(|n| *n >= 0).map(|n| n as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_rewrite() {
        assert_eq!(
            numbered_placeholders("SELECT * FROM t WHERE a = ? AND b IN (?, ?)"),
            "SELECT * FROM t WHERE a = $1 AND b IN ($2, $3)"
        );
        assert_eq!(numbered_placeholders("SELECT 1"), "SELECT 1");
    }
}
