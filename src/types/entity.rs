//! The persisted entity record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tenant::TenantId;

/// A persisted record with identity, tenancy, audit stamps, and an optional
/// soft-delete marker.
///
/// Data fields live in [`attrs`](Self::attrs) keyed by schema field name; the
/// metadata columns are first-class. Entities are produced by the repository
/// (`create`, `get_by_id`, `list`, ...) and never mutated by the filter,
/// pagination, or health components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity identity.
    pub id: String,

    /// Owning tenant, for tenant-scoped entities.
    pub tenant_id: Option<TenantId>,

    /// When the entity was created.
    pub created_at: DateTime<Utc>,

    /// Who created the entity.
    pub created_by: Option<String>,

    /// When the entity was last updated.
    pub updated_at: DateTime<Utc>,

    /// Who last updated the entity.
    pub updated_by: Option<String>,

    /// Soft-delete timestamp, if the entity has been soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,

    /// Who soft-deleted the entity.
    pub deleted_by: Option<String>,

    /// Declared data fields, keyed by schema field name.
    pub attrs: Map<String, Value>,
}

impl Entity {
    /// Returns `true` if the entity carries a soft-delete marker.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns a data field by name, if present.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Returns a text data field by name.
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Entity {
        let mut attrs = Map::new();
        attrs.insert("name".to_string(), json!("John"));
        Entity {
            id: "e-1".to_string(),
            tenant_id: Some(TenantId::new("acme")),
            created_at: Utc::now(),
            created_by: Some("tester".to_string()),
            updated_at: Utc::now(),
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            attrs,
        }
    }

    #[test]
    fn test_attr_access() {
        let entity = sample();
        assert_eq!(entity.attr_str("name"), Some("John"));
        assert!(entity.attr("missing").is_none());
    }

    #[test]
    fn test_is_deleted() {
        let mut entity = sample();
        assert!(!entity.is_deleted());
        entity.deleted_at = Some(Utc::now());
        assert!(entity.is_deleted());
    }
}
