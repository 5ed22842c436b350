//! Driver-neutral SQL values and rows.
//!
//! The repository core plans statements against [`SqlValue`] parameters and
//! decodes [`Row`]s back into entities; the adapters translate these to and
//! from the concrete driver types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ValidationError;
use crate::schema::FieldType;

/// A single bound value, independent of the underlying driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Boolean.
    Boolean(bool),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
}

/// A fetched row: column name to value.
pub type Row = HashMap<String, SqlValue>;

impl SqlValue {
    /// Returns `true` if this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Coerces a JSON value to a [`SqlValue`] of the declared field type.
    ///
    /// JSON `null` maps to [`SqlValue::Null`] regardless of the declared
    /// type. Timestamps are accepted as RFC 3339 strings.
    pub fn coerce(
        field: &str,
        field_type: FieldType,
        value: &Value,
    ) -> Result<SqlValue, ValidationError> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        let mismatch = || ValidationError::InvalidFieldValue {
            field: field.to_string(),
            expected: field_type.name().to_string(),
        };
        match field_type {
            FieldType::Text => value
                .as_str()
                .map(|s| SqlValue::Text(s.to_string()))
                .ok_or_else(mismatch),
            FieldType::Integer => value.as_i64().map(SqlValue::Integer).ok_or_else(mismatch),
            FieldType::Real => value.as_f64().map(SqlValue::Real).ok_or_else(mismatch),
            FieldType::Boolean => value.as_bool().map(SqlValue::Boolean).ok_or_else(mismatch),
            FieldType::Timestamp => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| SqlValue::Timestamp(dt.with_timezone(&Utc)))
                .ok_or_else(mismatch),
        }
    }

    /// Converts back to a JSON value, for entity attribute maps.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(n) => Value::from(*n),
            SqlValue::Real(f) => Value::from(*f),
            SqlValue::Text(s) => Value::from(s.clone()),
            SqlValue::Boolean(b) => Value::from(*b),
            SqlValue::Timestamp(dt) => Value::from(dt.to_rfc3339()),
        }
    }

    /// Returns the text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the timestamp content, if this is a timestamp value.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SqlValue::Timestamp(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Integer(n)
    }
}

impl From<f64> for SqlValue {
    fn from(f: f64) -> Self {
        SqlValue::Real(f)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(dt: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_matching_types() {
        assert_eq!(
            SqlValue::coerce("name", FieldType::Text, &json!("John")).unwrap(),
            SqlValue::Text("John".to_string())
        );
        assert_eq!(
            SqlValue::coerce("age", FieldType::Integer, &json!(42)).unwrap(),
            SqlValue::Integer(42)
        );
        assert_eq!(
            SqlValue::coerce("active", FieldType::Boolean, &json!(true)).unwrap(),
            SqlValue::Boolean(true)
        );
    }

    #[test]
    fn test_coerce_null_passthrough() {
        let v = SqlValue::coerce("age", FieldType::Integer, &Value::Null).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn test_coerce_mismatch() {
        let err = SqlValue::coerce("age", FieldType::Integer, &json!("forty")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFieldValue { .. }));
    }

    #[test]
    fn test_coerce_timestamp() {
        let v =
            SqlValue::coerce("at", FieldType::Timestamp, &json!("2024-06-01T12:00:00Z")).unwrap();
        assert!(v.as_timestamp().is_some());

        let err = SqlValue::coerce("at", FieldType::Timestamp, &json!("yesterday")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFieldValue { .. }));
    }

    #[test]
    fn test_json_roundtrip() {
        let v = SqlValue::Integer(7);
        assert_eq!(v.to_json(), json!(7));
        assert_eq!(SqlValue::Null.to_json(), Value::Null);
    }
}
