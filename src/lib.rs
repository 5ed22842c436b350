//! Unified data-access toolkit for relational stores.
//!
//! `repokit` provides a schema-driven repository with tenant isolation,
//! composable filtering, offset and cursor pagination, resilient transaction
//! execution (retry with backoff plus a circuit breaker), and health
//! diagnostics. All semantics are written once against a small executor seam;
//! feature-gated adapters bind it to SQLite (blocking) and PostgreSQL
//! (async).
//!
//! # Quick start
//!
//! ```
//! use repokit::repository::Repository;
//! use repokit::backends::sqlite::SqliteExecutor;
//! use repokit::schema::{EntitySchema, FieldType};
//! use repokit::tenant::TenantId;
//! use repokit::types::{QueryFilter, QueryOptions};
//! use serde_json::json;
//!
//! # fn main() -> repokit::RepoResult<()> {
//! let exec = SqliteExecutor::in_memory()?;
//! exec.execute_batch(
//!     "CREATE TABLE users (
//!          id TEXT PRIMARY KEY,
//!          tenant_id TEXT NOT NULL,
//!          created_at TEXT NOT NULL,
//!          created_by TEXT,
//!          updated_at TEXT NOT NULL,
//!          updated_by TEXT,
//!          deleted_at TEXT,
//!          deleted_by TEXT,
//!          name TEXT,
//!          age INTEGER
//!      )",
//! )?;
//!
//! let schema = EntitySchema::builder("user", "users")
//!     .field("name", FieldType::Text)
//!     .field("age", FieldType::Integer)
//!     .tenant_scoped()
//!     .build()?;
//!
//! let mut repo = Repository::new(exec, schema, Some(TenantId::new("acme")))?;
//! let user = repo.create(serde_json::from_value(json!({"name": "John", "age": 30}))?)?;
//!
//! let adults = repo.list(&QueryOptions::new().with_filter(QueryFilter::gte("age", 18)))?;
//! assert_eq!(adults.len(), 1);
//! assert_eq!(adults[0].id, user.id);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod backends;
pub mod breaker;
pub mod core;
pub mod error;
pub mod filter;
pub mod health;
pub mod paginate;
pub mod repository;
pub mod retry;
pub mod schema;
pub mod tenant;
pub mod transaction;
pub mod types;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use self::core::{AsyncExecutor, Executor, Statement};
pub use error::{
    BackendError, ConfigurationError, RepoError, RepoResult, TransientError, ValidationError,
};
pub use health::{AsyncHealthChecker, HealthCheckResult, HealthChecker, HealthConfig, HealthStatus};
pub use repository::{AsyncRepository, QueryPlanner, Repository};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use schema::{EntitySchema, FieldType};
pub use tenant::TenantId;
pub use transaction::{AsyncTransactionManager, TransactionManager};
pub use types::{
    CursorPaginationParams, CursorPaginationResult, Entity, FilterOp, PaginationConfig,
    PaginationParams, PaginationResult, QueryFilter, QueryOptions, SortDirection, SortField,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
