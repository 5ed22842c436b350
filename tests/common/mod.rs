//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Map, Value, json};

use repokit::backends::sqlite::SqliteExecutor;
use repokit::repository::Repository;
use repokit::schema::{EntitySchema, FieldType};
use repokit::tenant::TenantId;

pub const USERS_DDL: &str = "CREATE TABLE users (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    created_by TEXT,
    updated_at TEXT NOT NULL,
    updated_by TEXT,
    deleted_at TEXT,
    deleted_by TEXT,
    name TEXT,
    age INTEGER
)";

pub fn user_schema() -> Arc<EntitySchema> {
    EntitySchema::builder("user", "users")
        .field("name", FieldType::Text)
        .field("age", FieldType::Integer)
        .tenant_scoped()
        .build()
        .expect("valid schema")
}

pub fn sqlite_executor() -> SqliteExecutor {
    let exec = SqliteExecutor::in_memory().expect("in-memory sqlite");
    exec.execute_batch(USERS_DDL).expect("create table");
    exec
}

pub fn repo(tenant: &str) -> Repository<SqliteExecutor> {
    Repository::new(sqlite_executor(), user_schema(), Some(TenantId::new(tenant)))
        .expect("repository")
}

/// Rebinds an executor to another tenant, keeping the same database.
pub fn rebind(exec: SqliteExecutor, tenant: &str) -> Repository<SqliteExecutor> {
    Repository::new(exec, user_schema(), Some(TenantId::new(tenant))).expect("repository")
}

pub fn user(name: &str, age: i64) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("name".to_string(), json!(name));
    data.insert("age".to_string(), json!(age));
    data
}
