//! Entity-schema descriptor.
//!
//! The caller describes each persisted entity with an [`EntitySchema`]: the
//! table name, the whitelist of data fields with their types, and whether the
//! entity is tenant-scoped. The toolkit owns the metadata columns (identity,
//! audit stamps, soft-delete markers) and refuses schemas that redeclare them.
//!
//! The whitelist is the injection boundary: column names that appear in
//! generated SQL are always validated against it first, and values are always
//! bound as parameters.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ValidationError};

/// Column holding the entity identity.
pub const COL_ID: &str = "id";
/// Column holding the owning tenant.
pub const COL_TENANT: &str = "tenant_id";
/// Audit column: creation timestamp.
pub const COL_CREATED_AT: &str = "created_at";
/// Audit column: creating user.
pub const COL_CREATED_BY: &str = "created_by";
/// Audit column: last-update timestamp.
pub const COL_UPDATED_AT: &str = "updated_at";
/// Audit column: last-updating user.
pub const COL_UPDATED_BY: &str = "updated_by";
/// Soft-delete marker: deletion timestamp.
pub const COL_DELETED_AT: &str = "deleted_at";
/// Soft-delete marker: deleting user.
pub const COL_DELETED_BY: &str = "deleted_by";

/// All columns owned by the toolkit rather than the schema.
pub const RESERVED_COLUMNS: &[&str] = &[
    COL_ID,
    COL_TENANT,
    COL_CREATED_AT,
    COL_CREATED_BY,
    COL_UPDATED_AT,
    COL_UPDATED_BY,
    COL_DELETED_AT,
    COL_DELETED_BY,
];

/// The storage type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Real,
    /// Boolean.
    Boolean,
    /// UTC timestamp.
    Timestamp,
}

impl FieldType {
    /// Human-readable name, used in validation messages.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Real => "real",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
        }
    }
}

/// A declared data field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub field_type: FieldType,
}

/// Description of one persisted entity type.
///
/// Built once by the caller and shared (via `Arc`) with every repository over
/// the entity.
///
/// # Examples
///
/// ```
/// use repokit::schema::{EntitySchema, FieldType};
///
/// let schema = EntitySchema::builder("user", "users")
///     .field("name", FieldType::Text)
///     .field("age", FieldType::Integer)
///     .tenant_scoped()
///     .build()
///     .unwrap();
///
/// assert!(schema.is_tenant_scoped());
/// assert!(schema.field("name").is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySchema {
    entity: String,
    table: String,
    fields: Vec<FieldDef>,
    tenant_scoped: bool,
}

impl EntitySchema {
    /// Starts building a schema for `entity` stored in `table`.
    pub fn builder(entity: impl Into<String>, table: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            entity: entity.into(),
            table: table.into(),
            fields: Vec::new(),
            tenant_scoped: false,
        }
    }

    /// The logical entity name (used in error messages).
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The table the entity is stored in.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether rows carry a mandatory `tenant_id`.
    pub fn is_tenant_scoped(&self) -> bool {
        self.tenant_scoped
    }

    /// The declared data fields, in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks up a declared data field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the type of any filterable/sortable column: declared fields
    /// plus the metadata columns the toolkit maintains.
    pub fn column_type(&self, name: &str) -> Option<FieldType> {
        if let Some(field) = self.field(name) {
            return Some(field.field_type);
        }
        match name {
            COL_ID | COL_TENANT | COL_CREATED_BY | COL_UPDATED_BY | COL_DELETED_BY => {
                Some(FieldType::Text)
            }
            COL_CREATED_AT | COL_UPDATED_AT | COL_DELETED_AT => Some(FieldType::Timestamp),
            _ => None,
        }
    }

    /// Validates that `name` is a known column, for use in generated SQL.
    pub fn require_column(&self, name: &str) -> Result<FieldType, ValidationError> {
        self.column_type(name)
            .ok_or_else(|| ValidationError::UnknownField {
                field: name.to_string(),
                entity: self.entity.clone(),
            })
    }
}

/// Builder for [`EntitySchema`].
#[derive(Debug)]
pub struct EntitySchemaBuilder {
    entity: String,
    table: String,
    fields: Vec<FieldDef>,
    tenant_scoped: bool,
}

impl EntitySchemaBuilder {
    /// Declares a data field.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            field_type,
        });
        self
    }

    /// Marks the entity as tenant-scoped. Repositories over a tenant-scoped
    /// schema must be constructed with a tenant id.
    pub fn tenant_scoped(mut self) -> Self {
        self.tenant_scoped = true;
        self
    }

    /// Finishes the schema, rejecting fields that collide with reserved
    /// metadata columns.
    pub fn build(self) -> Result<Arc<EntitySchema>, ConfigurationError> {
        for field in &self.fields {
            if RESERVED_COLUMNS.contains(&field.name.as_str()) {
                return Err(ConfigurationError::ReservedField {
                    field: field.name.clone(),
                });
            }
        }
        Ok(Arc::new(EntitySchema {
            entity: self.entity,
            table: self.table,
            fields: self.fields,
            tenant_scoped: self.tenant_scoped,
        }))
    }
}
