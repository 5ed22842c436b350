//! Structured filter and sort specification.
//!
//! Filters are tagged variants with an explicit operator enum rather than
//! string-keyed maps, so the filter engine can handle every operator
//! exhaustively and reject malformed input before a query is built.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::pagination::{CursorPaginationParams, PaginationParams};

/// Comparison operator for a [`QueryFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Value is one of a sequence.
    In,
    /// Value is not one of a sequence.
    NotIn,
    /// Case-sensitive substring match. Literal `%`/`_` in the caller's value
    /// are escaped before the wildcard wrap.
    Like,
    /// Case-insensitive substring match.
    Ilike,
    /// Column is NULL. The filter value is ignored.
    IsNull,
    /// Column is not NULL. The filter value is ignored.
    IsNotNull,
    /// Value lies within an inclusive two-element range.
    Between,
}

impl FilterOp {
    /// Operator name as used in validation messages.
    pub fn name(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
            FilterOp::NotIn => "not_in",
            FilterOp::Like => "like",
            FilterOp::Ilike => "ilike",
            FilterOp::IsNull => "is_null",
            FilterOp::IsNotNull => "is_not_null",
            FilterOp::Between => "between",
        }
    }
}

/// A single field predicate. Filters in a [`QueryOptions`] combine with AND.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Field name; must belong to the entity's schema whitelist.
    pub field: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Operand. Scalar for comparison operators, array for `In`/`NotIn`,
    /// two-element array for `Between`, ignored for the null checks.
    pub value: Value,
}

impl QueryFilter {
    /// Creates a filter with an explicit operator.
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// `field != value`
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Ne, value)
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gt, value)
    }

    /// `field >= value`
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gte, value)
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lt, value)
    }

    /// `field <= value`
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lte, value)
    }

    /// `field IN (values...)`
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOp::In, Value::Array(values))
    }

    /// `field NOT IN (values...)`
    pub fn not_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOp::NotIn, Value::Array(values))
    }

    /// Case-sensitive substring match.
    pub fn like(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOp::Like, Value::String(value.into()))
    }

    /// Case-insensitive substring match.
    pub fn ilike(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOp::Ilike, Value::String(value.into()))
    }

    /// `field IS NULL`
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOp::IsNull, Value::Null)
    }

    /// `field IS NOT NULL`
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOp::IsNotNull, Value::Null)
    }

    /// `field BETWEEN low AND high` (inclusive).
    pub fn between(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::new(
            field,
            FilterOp::Between,
            Value::Array(vec![low.into(), high.into()]),
        )
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// SQL keyword for this direction.
    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A single sort key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortField {
    /// Field name; must belong to the schema whitelist.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

impl SortField {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// A complete query specification: conjunctive filters, ordered sort keys,
/// at most one pagination strategy, and the soft-delete visibility flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Filters, combined with AND.
    pub filters: Vec<QueryFilter>,

    /// Sort keys, in priority order. The primary key is always appended as a
    /// final tie-breaker by the filter engine.
    pub sort: Vec<SortField>,

    /// Offset pagination parameters, applied as a `LIMIT/OFFSET` window.
    /// Mutually exclusive with `cursor`.
    pub pagination: Option<PaginationParams>,

    /// Cursor pagination parameters, applied as a keyset window past the
    /// cursor key. Mutually exclusive with `pagination`.
    pub cursor: Option<CursorPaginationParams>,

    /// Include soft-deleted rows. Defaults to `false`.
    pub include_deleted: bool,
}

impl QueryOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter.
    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a sort key.
    pub fn with_sort(mut self, sort: SortField) -> Self {
        self.sort.push(sort);
        self
    }

    /// Uses offset pagination. Clears any cursor parameters.
    pub fn with_pagination(mut self, params: PaginationParams) -> Self {
        self.pagination = Some(params);
        self.cursor = None;
        self
    }

    /// Uses cursor pagination. Clears any offset parameters.
    pub fn with_cursor(mut self, params: CursorPaginationParams) -> Self {
        self.cursor = Some(params);
        self.pagination = None;
        self
    }

    /// Includes soft-deleted rows in results.
    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_constructors() {
        let f = QueryFilter::eq("name", "John");
        assert_eq!(f.op, FilterOp::Eq);
        assert_eq!(f.value, json!("John"));

        let f = QueryFilter::between("age", 18, 65);
        assert_eq!(f.value, json!([18, 65]));

        let f = QueryFilter::is_null("deleted_at");
        assert!(f.value.is_null());
    }

    #[test]
    fn test_options_pagination_exclusivity() {
        let opts = QueryOptions::new()
            .with_cursor(CursorPaginationParams::new(10))
            .with_pagination(PaginationParams::new(1, 20));
        assert!(opts.pagination.is_some());
        assert!(opts.cursor.is_none());

        let opts = QueryOptions::new()
            .with_pagination(PaginationParams::new(1, 20))
            .with_cursor(CursorPaginationParams::new(10));
        assert!(opts.pagination.is_none());
        assert!(opts.cursor.is_some());
    }

    #[test]
    fn test_sort_builders() {
        let s = SortField::desc("created_at");
        assert_eq!(s.direction, SortDirection::Desc);
        assert_eq!(s.direction.sql(), "DESC");
    }
}
