//! Query planning for repository operations.
//!
//! The planner owns every semantic rule of the repository: field whitelist
//! validation, tenant scoping, audit stamping, soft-delete visibility, and
//! row decoding. The sync and async repository frontends only drive the
//! planned statements through an executor, so the two cannot diverge.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::Statement;
use crate::error::{ConfigurationError, RepoError, RepoResult, ValidationError};
use crate::filter::{Predicate, build_order_by, build_predicate};
use crate::schema::{
    COL_CREATED_AT, COL_CREATED_BY, COL_DELETED_AT, COL_DELETED_BY, COL_ID, COL_TENANT,
    COL_UPDATED_AT, COL_UPDATED_BY, EntitySchema,
};
use crate::tenant::TenantId;
use crate::types::entity::Entity;
use crate::types::pagination::PaginationConfig;
use crate::types::query::QueryOptions;
use crate::types::value::{Row, SqlValue};

/// Columns a caller may never write through `create` or `update` data.
const IMMUTABLE_IN_UPDATE: &[&str] = &[
    COL_ID,
    COL_TENANT,
    COL_CREATED_AT,
    COL_CREATED_BY,
    COL_UPDATED_AT,
    COL_UPDATED_BY,
    COL_DELETED_AT,
    COL_DELETED_BY,
];

/// Audit and soft-delete columns the toolkit stamps itself.
const STAMPED: &[&str] = &[
    COL_CREATED_AT,
    COL_CREATED_BY,
    COL_UPDATED_AT,
    COL_UPDATED_BY,
    COL_DELETED_AT,
    COL_DELETED_BY,
];

/// Plans repository statements over one entity schema, bound to at most one
/// tenant.
///
/// Construction fails for a tenant-scoped schema without a tenant, so an
/// unscoped query over tenant data cannot be expressed at all.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    schema: Arc<EntitySchema>,
    tenant: Option<TenantId>,
    config: PaginationConfig,
    actor: Option<String>,
}

impl QueryPlanner {
    /// Creates a planner for `schema`, scoped to `tenant` when the schema
    /// requires one.
    pub fn new(schema: Arc<EntitySchema>, tenant: Option<TenantId>) -> RepoResult<Self> {
        if schema.is_tenant_scoped() && tenant.is_none() {
            return Err(ConfigurationError::MissingTenant {
                entity: schema.entity().to_string(),
            }
            .into());
        }
        if !schema.is_tenant_scoped() && tenant.is_some() {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "entity '{}' is not tenant-scoped but a tenant was provided",
                    schema.entity()
                ),
            }
            .into());
        }
        Ok(Self {
            schema,
            tenant,
            config: PaginationConfig::default(),
            actor: None,
        })
    }

    /// Overrides the pagination tunables.
    pub fn with_pagination_config(mut self, config: PaginationConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the acting user recorded in audit stamps.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// The schema this planner serves.
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// The pagination tunables in effect.
    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    /// The column list every row-returning statement selects, in decode
    /// order.
    pub fn select_columns(&self) -> String {
        let mut cols = vec![COL_ID.to_string()];
        if self.schema.is_tenant_scoped() {
            cols.push(COL_TENANT.to_string());
        }
        cols.extend(STAMPED.iter().map(|c| c.to_string()));
        cols.extend(self.schema.fields().iter().map(|f| f.name.clone()));
        cols.join(", ")
    }

    /// The implicit predicate every read and write runs under: the bound
    /// tenant plus live-rows-only, unless deleted rows were asked for.
    pub fn base_predicate(&self, include_deleted: bool) -> Predicate {
        let mut predicate = Predicate::empty();
        if let Some(tenant) = &self.tenant {
            predicate = predicate.and(Predicate {
                sql: format!("{COL_TENANT} = ?"),
                params: vec![SqlValue::Text(tenant.as_str().to_string())],
            });
        }
        if !include_deleted {
            predicate = predicate.and(Predicate {
                sql: format!("{COL_DELETED_AT} IS NULL"),
                params: Vec::new(),
            });
        }
        predicate
    }

    /// The full predicate for a query: the implicit base conjoined with the
    /// caller's validated filters.
    pub fn query_predicate(&self, options: &QueryOptions) -> RepoResult<Predicate> {
        let filters = build_predicate(&self.schema, &options.filters)?;
        Ok(self.base_predicate(options.include_deleted).and(filters))
    }

    fn check_tenant_claim(&self, data: &Map<String, Value>) -> Result<(), ValidationError> {
        let Some(claimed) = data.get(COL_TENANT) else {
            return Ok(());
        };
        let Some(scoped) = &self.tenant else {
            return Err(ValidationError::UnknownField {
                field: COL_TENANT.to_string(),
                entity: self.schema.entity().to_string(),
            });
        };
        match claimed.as_str() {
            Some(s) if s == scoped.as_str() => Ok(()),
            Some(s) => Err(ValidationError::TenantMismatch {
                provided: s.to_string(),
                scoped: scoped.as_str().to_string(),
            }),
            None => Err(ValidationError::InvalidFieldValue {
                field: COL_TENANT.to_string(),
                expected: "a string tenant id".to_string(),
            }),
        }
    }

    /// Plans an `INSERT` and builds the entity it persists.
    ///
    /// An absent id is generated; a supplied `tenant_id` must match the bound
    /// tenant. Audit columns are stamped, never taken from the data.
    pub fn plan_insert(&self, data: &Map<String, Value>) -> RepoResult<(Statement, Entity)> {
        self.check_tenant_claim(data)?;

        let mut attrs = Map::new();
        let mut field_values = Vec::new();
        for (key, value) in data {
            if key == COL_ID || key == COL_TENANT {
                continue;
            }
            if STAMPED.contains(&key.as_str()) {
                return Err(ValidationError::ImmutableField { field: key.clone() }.into());
            }
            let field = self.schema.field(key).ok_or_else(|| {
                ValidationError::UnknownField {
                    field: key.clone(),
                    entity: self.schema.entity().to_string(),
                }
            })?;
            field_values.push((key.clone(), SqlValue::coerce(key, field.field_type, value)?));
            attrs.insert(key.clone(), value.clone());
        }

        let id = match data.get(COL_ID) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(_) => {
                return Err(ValidationError::InvalidFieldValue {
                    field: COL_ID.to_string(),
                    expected: "a non-empty string id".to_string(),
                }
                .into());
            }
            None => Uuid::new_v4().to_string(),
        };
        let now = Utc::now();

        let mut columns = vec![COL_ID];
        let mut params = vec![SqlValue::Text(id.clone())];
        if let Some(tenant) = &self.tenant {
            columns.push(COL_TENANT);
            params.push(SqlValue::Text(tenant.as_str().to_string()));
        }
        columns.extend([COL_CREATED_AT, COL_CREATED_BY, COL_UPDATED_AT, COL_UPDATED_BY]);
        params.push(SqlValue::Timestamp(now));
        params.push(self.actor_value());
        params.push(SqlValue::Timestamp(now));
        params.push(self.actor_value());
        for (name, value) in &field_values {
            columns.push(name.as_str());
            params.push(value.clone());
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let stmt = Statement::new(
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                self.schema.table(),
                columns.join(", ")
            ),
            params,
        );

        let entity = Entity {
            id,
            tenant_id: self.tenant.clone(),
            created_at: now,
            created_by: self.actor.clone(),
            updated_at: now,
            updated_by: self.actor.clone(),
            deleted_at: None,
            deleted_by: None,
            attrs,
        };
        Ok((stmt, entity))
    }

    /// Plans the lookup of a single row by id.
    pub fn plan_get_by_id(&self, id: &str, include_deleted: bool) -> Statement {
        let predicate = self.base_predicate(include_deleted).and(id_predicate(id));
        Statement::new(
            format!(
                "SELECT {} FROM {}{}",
                self.select_columns(),
                self.schema.table(),
                predicate.where_clause()
            ),
            predicate.params,
        )
    }

    /// Plans a partial `UPDATE` of the given data fields.
    ///
    /// Identity, tenancy, and stamped columns are immutable through data;
    /// `updated_at`/`updated_by` are re-stamped by the statement itself.
    pub fn plan_update(&self, id: &str, data: &Map<String, Value>) -> RepoResult<Statement> {
        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for (key, value) in data {
            if IMMUTABLE_IN_UPDATE.contains(&key.as_str()) {
                return Err(ValidationError::ImmutableField { field: key.clone() }.into());
            }
            let field = self.schema.field(key).ok_or_else(|| {
                ValidationError::UnknownField {
                    field: key.clone(),
                    entity: self.schema.entity().to_string(),
                }
            })?;
            assignments.push(format!("{key} = ?"));
            params.push(SqlValue::coerce(key, field.field_type, value)?);
        }
        assignments.push(format!("{COL_UPDATED_AT} = ?"));
        params.push(SqlValue::Timestamp(Utc::now()));
        assignments.push(format!("{COL_UPDATED_BY} = ?"));
        params.push(self.actor_value());

        let predicate = self.base_predicate(false).and(id_predicate(id));
        let where_clause = predicate.where_clause();
        params.extend(predicate.params);
        Ok(Statement::new(
            format!(
                "UPDATE {} SET {}{where_clause}",
                self.schema.table(),
                assignments.join(", ")
            ),
            params,
        ))
    }

    /// Plans a soft delete: stamps the deletion marker on a live row.
    pub fn plan_soft_delete(&self, id: &str) -> Statement {
        let predicate = self.base_predicate(false).and(id_predicate(id));
        let where_clause = predicate.where_clause();
        let mut params = vec![SqlValue::Timestamp(Utc::now()), self.actor_value()];
        params.extend(predicate.params);
        Statement::new(
            format!(
                "UPDATE {} SET {COL_DELETED_AT} = ?, {COL_DELETED_BY} = ?{where_clause}",
                self.schema.table()
            ),
            params,
        )
    }

    /// Plans a hard delete: removes the row regardless of soft-delete state.
    pub fn plan_hard_delete(&self, id: &str) -> Statement {
        let predicate = self.base_predicate(true).and(id_predicate(id));
        Statement::new(
            format!(
                "DELETE FROM {}{}",
                self.schema.table(),
                predicate.where_clause()
            ),
            predicate.params,
        )
    }

    /// Plans a `SELECT` under the caller's filters and sort.
    ///
    /// A pagination strategy carried in the options windows the rows: offset
    /// parameters become a `LIMIT/OFFSET`, cursor parameters a keyset window
    /// past the cursor key. Without one, every matching row is selected.
    pub fn plan_select(&self, options: &QueryOptions) -> RepoResult<Statement> {
        let predicate = self.query_predicate(options)?;
        if let Some(params) = options.pagination {
            params.validate()?;
            return Ok(crate::paginate::plan_offset_data(
                &self.schema,
                &self.select_columns(),
                &predicate,
                &options.sort,
                params,
            )?);
        }
        if let Some(params) = &options.cursor {
            params.validate()?;
            self.schema.require_column(&params.cursor_field)?;
            let sort_field = crate::paginate::cursor_sort_field(params, &options.sort);
            let after = crate::paginate::cursor_predicate(params, &sort_field)?;
            return Ok(crate::paginate::plan_keyset_data(
                &self.schema,
                &self.select_columns(),
                &predicate,
                after,
                &sort_field,
                params.limit,
            )?);
        }
        let order_by = build_order_by(&self.schema, &options.sort)?;
        Ok(Statement::new(
            format!(
                "SELECT {} FROM {}{}{order_by}",
                self.select_columns(),
                self.schema.table(),
                predicate.where_clause()
            ),
            predicate.params,
        ))
    }

    /// Plans a `COUNT` under the caller's filters.
    pub fn plan_count(&self, options: &QueryOptions) -> RepoResult<Statement> {
        let predicate = self.query_predicate(options)?;
        Ok(crate::paginate::plan_count(self.schema.table(), &predicate))
    }

    /// Decodes a fetched row into an [`Entity`].
    pub fn decode_row(&self, row: &Row) -> RepoResult<Entity> {
        let id = text_column(row, COL_ID)?;
        let tenant_id = if self.schema.is_tenant_scoped() {
            Some(TenantId::new(text_column(row, COL_TENANT)?))
        } else {
            None
        };
        let created_at = timestamp_column(row, COL_CREATED_AT)?;
        let updated_at = timestamp_column(row, COL_UPDATED_AT)?;
        let deleted_at = match row.get(COL_DELETED_AT) {
            None | Some(SqlValue::Null) => None,
            Some(_) => Some(timestamp_column(row, COL_DELETED_AT)?),
        };

        let mut attrs = Map::new();
        for field in self.schema.fields() {
            if let Some(value) = row.get(&field.name) {
                attrs.insert(field.name.clone(), attr_json(field.field_type, value));
            }
        }

        Ok(Entity {
            id,
            tenant_id,
            created_at,
            created_by: optional_text(row, COL_CREATED_BY),
            updated_at,
            updated_by: optional_text(row, COL_UPDATED_BY),
            deleted_at,
            deleted_by: optional_text(row, COL_DELETED_BY),
            attrs,
        })
    }

    /// The entity name for error construction.
    pub fn entity_name(&self) -> &str {
        self.schema.entity()
    }

    fn actor_value(&self) -> SqlValue {
        match &self.actor {
            Some(actor) => SqlValue::Text(actor.clone()),
            None => SqlValue::Null,
        }
    }
}

fn id_predicate(id: &str) -> Predicate {
    Predicate {
        sql: format!("{COL_ID} = ?"),
        params: vec![SqlValue::Text(id.to_string())],
    }
}

fn text_column(row: &Row, column: &str) -> RepoResult<String> {
    row.get(column)
        .and_then(|v| v.as_text())
        .map(String::from)
        .ok_or_else(|| RepoError::conversion(format!("missing or non-text column '{column}'")))
}

fn optional_text(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(|v| v.as_text()).map(String::from)
}

// Stores without a native timestamp type hand timestamps back as RFC 3339
// text and booleans as 0/1 integers; normalize against the declared type.
fn attr_json(field_type: crate::schema::FieldType, value: &SqlValue) -> Value {
    use crate::schema::FieldType;
    match (field_type, value) {
        (FieldType::Boolean, SqlValue::Integer(n)) => Value::Bool(*n != 0),
        (FieldType::Real, SqlValue::Integer(n)) => Value::from(*n as f64),
        _ => value.to_json(),
    }
}

fn timestamp_column(row: &Row, column: &str) -> RepoResult<chrono::DateTime<Utc>> {
    let parsed = match row.get(column) {
        Some(SqlValue::Timestamp(dt)) => Some(*dt),
        Some(SqlValue::Text(s)) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    };
    parsed.ok_or_else(|| {
        RepoError::conversion(format!("missing or non-timestamp column '{column}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use serde_json::json;
    use std::collections::HashMap;

    fn scoped_schema() -> Arc<EntitySchema> {
        EntitySchema::builder("user", "users")
            .field("name", FieldType::Text)
            .field("age", FieldType::Integer)
            .tenant_scoped()
            .build()
            .unwrap()
    }

    fn planner() -> QueryPlanner {
        QueryPlanner::new(scoped_schema(), Some(TenantId::new("acme"))).unwrap()
    }

    fn data(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_scoped_schema_requires_tenant() {
        let err = QueryPlanner::new(scoped_schema(), None).unwrap_err();
        assert!(matches!(
            err,
            RepoError::Configuration(ConfigurationError::MissingTenant { .. })
        ));
    }

    #[test]
    fn test_unscoped_schema_rejects_tenant() {
        let schema = EntitySchema::builder("setting", "settings")
            .field("name", FieldType::Text)
            .build()
            .unwrap();
        assert!(QueryPlanner::new(schema, Some(TenantId::new("acme"))).is_err());
    }

    #[test]
    fn test_insert_generates_id_and_stamps() {
        let (stmt, entity) = planner()
            .with_actor("tester")
            .plan_insert(&data(&[("name", json!("John")), ("age", json!(30))]))
            .unwrap();
        assert!(stmt.sql.starts_with("INSERT INTO users (id, tenant_id, created_at"));
        assert!(!entity.id.is_empty());
        assert_eq!(entity.tenant_id.as_ref().unwrap().as_str(), "acme");
        assert_eq!(entity.created_by.as_deref(), Some("tester"));
        assert_eq!(entity.attr_str("name"), Some("John"));
    }

    #[test]
    fn test_insert_rejects_unknown_field() {
        let err = planner()
            .plan_insert(&data(&[("nme", json!("John"))]))
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Validation(ValidationError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_insert_rejects_foreign_tenant() {
        let err = planner()
            .plan_insert(&data(&[("name", json!("x")), ("tenant_id", json!("rival"))]))
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Validation(ValidationError::TenantMismatch { .. })
        ));
    }

    #[test]
    fn test_insert_accepts_matching_tenant_and_own_id() {
        let (_, entity) = planner()
            .plan_insert(&data(&[
                ("id", json!("user-1")),
                ("tenant_id", json!("acme")),
                ("name", json!("x")),
            ]))
            .unwrap();
        assert_eq!(entity.id, "user-1");
    }

    #[test]
    fn test_insert_rejects_stamped_columns() {
        let err = planner()
            .plan_insert(&data(&[("created_at", json!("2024-01-01T00:00:00Z"))]))
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Validation(ValidationError::ImmutableField { .. })
        ));
    }

    #[test]
    fn test_get_by_id_scopes_tenant_and_liveness() {
        let stmt = planner().plan_get_by_id("user-1", false);
        assert!(stmt.sql.contains("tenant_id = ?"));
        assert!(stmt.sql.contains("deleted_at IS NULL"));
        assert!(stmt.sql.contains("id = ?"));
    }

    #[test]
    fn test_update_rejects_immutable_fields() {
        for field in ["id", "tenant_id", "updated_at"] {
            let err = planner()
                .plan_update("user-1", &data(&[(field, json!("x"))]))
                .unwrap_err();
            assert!(matches!(
                err,
                RepoError::Validation(ValidationError::ImmutableField { .. })
            ));
        }
    }

    #[test]
    fn test_update_stamps_and_scopes() {
        let stmt = planner()
            .plan_update("user-1", &data(&[("age", json!(31))]))
            .unwrap();
        assert!(stmt.sql.contains("age = ?"));
        assert!(stmt.sql.contains("updated_at = ?"));
        assert!(stmt.sql.contains("deleted_at IS NULL"));
    }

    #[test]
    fn test_update_binds_assignments_before_scope() {
        let stmt = planner()
            .plan_update("user-1", &data(&[("age", json!(31))]))
            .unwrap();
        let placeholders = stmt.sql.matches('?').count();
        assert_eq!(stmt.params.len(), placeholders);
        // age, updated_at, updated_by, then tenant and id from the scope
        assert_eq!(stmt.params[0], SqlValue::Integer(31));
        assert_eq!(stmt.params[3], SqlValue::Text("acme".into()));
        assert_eq!(stmt.params[4], SqlValue::Text("user-1".into()));
    }

    #[test]
    fn test_soft_delete_only_touches_live_rows() {
        let stmt = planner().plan_soft_delete("user-1");
        assert!(stmt.sql.contains("SET deleted_at = ?"));
        assert!(stmt.sql.contains("deleted_at IS NULL"));
        assert_eq!(stmt.params.len(), stmt.sql.matches('?').count());
        assert_eq!(stmt.params[3], SqlValue::Text("user-1".into()));
    }

    #[test]
    fn test_hard_delete_ignores_liveness() {
        let stmt = planner().plan_hard_delete("user-1");
        assert!(stmt.sql.starts_with("DELETE FROM users"));
        assert!(!stmt.sql.contains("deleted_at IS NULL"));
        assert!(stmt.sql.contains("tenant_id = ?"));
    }

    #[test]
    fn test_select_always_prepends_tenant() {
        let stmt = planner()
            .plan_select(&QueryOptions::new().with_filter(crate::types::QueryFilter::eq(
                "name", "John",
            )))
            .unwrap();
        let tenant_pos = stmt.sql.find("tenant_id = ?").unwrap();
        let name_pos = stmt.sql.find("name = ?").unwrap();
        assert!(tenant_pos < name_pos);
    }

    #[test]
    fn test_select_windows_on_offset_pagination() {
        let options = QueryOptions::new()
            .with_pagination(crate::types::PaginationParams::new(2, 10));
        let stmt = planner().plan_select(&options).unwrap();
        assert!(stmt.sql.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(
            &stmt.params[stmt.params.len() - 2..],
            &[SqlValue::Integer(10), SqlValue::Integer(10)]
        );
    }

    #[test]
    fn test_select_windows_on_cursor_pagination() {
        let options = QueryOptions::new()
            .with_cursor(crate::types::CursorPaginationParams::new(5));
        let stmt = planner().plan_select(&options).unwrap();
        assert!(stmt.sql.ends_with("ORDER BY id ASC LIMIT ?"));
        // No sentinel row outside the cursor_paginate surface.
        assert_eq!(stmt.params.last(), Some(&SqlValue::Integer(5)));
    }

    #[test]
    fn test_include_deleted_drops_liveness_clause() {
        let stmt = planner()
            .plan_select(&QueryOptions::new().include_deleted())
            .unwrap();
        assert!(!stmt.sql.contains("deleted_at IS NULL"));
        assert!(stmt.sql.contains("tenant_id = ?"));
    }

    #[test]
    fn test_decode_row_roundtrip() {
        let planner = planner();
        let now = Utc::now();
        let mut row: Row = HashMap::new();
        row.insert("id".into(), SqlValue::Text("user-1".into()));
        row.insert("tenant_id".into(), SqlValue::Text("acme".into()));
        row.insert("created_at".into(), SqlValue::Timestamp(now));
        row.insert("created_by".into(), SqlValue::Text("tester".into()));
        row.insert("updated_at".into(), SqlValue::Timestamp(now));
        row.insert("updated_by".into(), SqlValue::Null);
        row.insert("deleted_at".into(), SqlValue::Null);
        row.insert("deleted_by".into(), SqlValue::Null);
        row.insert("name".into(), SqlValue::Text("John".into()));
        row.insert("age".into(), SqlValue::Integer(30));

        let entity = planner.decode_row(&row).unwrap();
        assert_eq!(entity.id, "user-1");
        assert_eq!(entity.attr("age"), Some(&json!(30)));
        assert!(!entity.is_deleted());
        assert!(entity.updated_by.is_none());
    }
}
