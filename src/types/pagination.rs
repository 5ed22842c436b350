//! Pagination parameters, results, and the opaque page cursor.
//!
//! Two strategies are supported: offset pagination (with total counts, not
//! snapshot-consistent under concurrent writes) and cursor pagination (keyset
//! based, stable under concurrent inserts and deletes outside the current
//! window).

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::schema::COL_ID;
use crate::types::value::SqlValue;

/// Offset pagination request: 1-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationParams {
    /// 1-based page number.
    pub page: u64,
    /// Rows per page.
    pub per_page: u64,
}

impl PaginationParams {
    /// Creates offset pagination parameters.
    pub fn new(page: u64, per_page: u64) -> Self {
        Self { page, per_page }
    }

    /// Rejects zero page numbers or page sizes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page == 0 || self.per_page == 0 {
            return Err(ValidationError::InvalidPagination {
                message: format!("page and per_page must be >= 1, got page={} per_page={}", self.page, self.per_page),
            });
        }
        Ok(())
    }

    /// Number of rows before this page.
    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.per_page
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

/// Cursor pagination request.
///
/// `cursor_field` is the sort key the traversal is ordered by; rows with NULL
/// values in it degrade the cursor predicate to an id-only comparison within
/// the NULL group, so prefer non-nullable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPaginationParams {
    /// Maximum rows per page.
    pub limit: u64,
    /// Opaque cursor from a previous page, or `None` for the first page.
    pub cursor: Option<String>,
    /// The sort key the cursor is relative to. Defaults to the primary key.
    pub cursor_field: String,
}

impl CursorPaginationParams {
    /// Creates first-page cursor parameters ordered by the primary key.
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            cursor: None,
            cursor_field: COL_ID.to_string(),
        }
    }

    /// Orders the traversal by the given field.
    pub fn with_cursor_field(mut self, field: impl Into<String>) -> Self {
        self.cursor_field = field.into();
        self
    }

    /// Resumes from an opaque cursor token.
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Rejects zero limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.limit == 0 {
            return Err(ValidationError::InvalidPagination {
                message: "cursor limit must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

/// An offset-paginated result set.
///
/// Invariants: `total` equals `count()` under the same filters, and
/// `pages == ceil(total / per_page)`. The count and data queries are issued
/// independently and are not guaranteed to observe the same snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationResult<T> {
    /// The rows of this page.
    pub items: Vec<T>,
    /// Total matching rows (exact, or approximate past the configured
    /// count threshold when the store supplies an estimate).
    pub total: u64,
    /// 1-based page number.
    pub page: u64,
    /// Rows per page.
    pub per_page: u64,
    /// Total page count.
    pub pages: u64,
    /// Whether a later page exists.
    pub has_next: bool,
    /// Whether an earlier page exists.
    pub has_prev: bool,
}

impl<T> PaginationResult<T> {
    /// Assembles a page from items plus the independent total count.
    pub fn new(items: Vec<T>, total: u64, params: PaginationParams) -> Self {
        let pages = total.div_ceil(params.per_page);
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
            pages,
            has_next: params.page * params.per_page < total,
            has_prev: params.page > 1,
        }
    }
}

/// A cursor-paginated result set.
///
/// Traversing from a null cursor until `has_more` is `false` visits every
/// matching row exactly once, in sort order, regardless of concurrent inserts
/// elsewhere in the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPaginationResult<T> {
    /// The rows of this page.
    pub items: Vec<T>,
    /// Cursor for the next page, if one exists.
    pub next_cursor: Option<String>,
    /// Whether more rows follow this page.
    pub has_more: bool,
}

/// A value captured in a cursor for keyset comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CursorValue {
    /// String value (also used for timestamps, as RFC 3339).
    String(String),
    /// Integer value.
    Number(i64),
    /// Float value.
    Decimal(f64),
    /// Boolean value.
    Boolean(bool),
    /// Null value.
    Null,
}

impl From<&SqlValue> for CursorValue {
    fn from(value: &SqlValue) -> Self {
        match value {
            SqlValue::Null => CursorValue::Null,
            SqlValue::Integer(n) => CursorValue::Number(*n),
            SqlValue::Real(f) => CursorValue::Decimal(*f),
            SqlValue::Text(s) => CursorValue::String(s.clone()),
            SqlValue::Boolean(b) => CursorValue::Boolean(*b),
            SqlValue::Timestamp(dt) => CursorValue::String(dt.to_rfc3339()),
        }
    }
}

impl CursorValue {
    /// Converts back to a bindable SQL value.
    pub fn to_sql(&self) -> SqlValue {
        match self {
            CursorValue::Null => SqlValue::Null,
            CursorValue::Number(n) => SqlValue::Integer(*n),
            CursorValue::Decimal(f) => SqlValue::Real(*f),
            CursorValue::String(s) => SqlValue::Text(s.clone()),
            CursorValue::Boolean(b) => SqlValue::Boolean(*b),
        }
    }
}

/// An opaque keyset cursor.
///
/// Encodes the `(sort_field_value, id)` of the last returned row as
/// URL-safe base64 over JSON. Clients treat it as opaque; the version field
/// guards against format drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageCursor {
    version: u8,
    sort_value: CursorValue,
    id: String,
}

impl PageCursor {
    /// Creates a cursor at the given position.
    pub fn new(sort_value: CursorValue, id: impl Into<String>) -> Self {
        Self {
            version: 1,
            sort_value,
            id: id.into(),
        }
    }

    /// The sort-key value at the cursor position.
    pub fn sort_value(&self) -> &CursorValue {
        &self.sort_value
    }

    /// The row id at the cursor position (tie-breaker).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Encodes the cursor to an opaque token.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(&json)
    }

    /// Decodes a cursor from an opaque token.
    pub fn decode(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidCursor {
            cursor: s.to_string(),
        };
        let bytes = URL_SAFE_NO_PAD.decode(s).map_err(|_| invalid())?;
        let cursor: PageCursor = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
        if cursor.version != 1 {
            return Err(invalid());
        }
        Ok(cursor)
    }
}

/// Construction-time pagination tunables.
///
/// Past `deep_page_threshold` rows of offset the engine switches to a
/// seek-based rewrite instead of a linear-scan `OFFSET`. When the adapter can
/// report an approximate row count and that estimate exceeds
/// `count_threshold`, the approximation stands in for the exact `COUNT(*)`,
/// trading exactness for latency on unfiltered queries.
#[derive(Debug, Clone, Copy)]
pub struct PaginationConfig {
    /// Offset depth (in rows) past which the seek rewrite engages.
    pub deep_page_threshold: u64,
    /// Estimated table size past which an approximate count is accepted.
    pub count_threshold: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            deep_page_threshold: 10_000,
            count_threshold: 100_000,
        }
    }
}

impl PaginationConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the seek-rewrite offset depth.
    pub fn with_deep_page_threshold(mut self, rows: u64) -> Self {
        self.deep_page_threshold = rows;
        self
    }

    /// Sets the approximate-count crossover.
    pub fn with_count_threshold(mut self, rows: u64) -> Self {
        self.count_threshold = rows;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_params_validate() {
        assert!(PaginationParams::new(1, 20).validate().is_ok());
        assert!(PaginationParams::new(0, 20).validate().is_err());
        assert!(PaginationParams::new(1, 0).validate().is_err());
    }

    #[test]
    fn test_pagination_result_invariants() {
        let result = PaginationResult::new(vec![1, 2, 3], 7, PaginationParams::new(2, 3));
        assert_eq!(result.pages, 3);
        assert!(result.has_next);
        assert!(result.has_prev);

        let last = PaginationResult::new(vec![7], 7, PaginationParams::new(3, 3));
        assert!(!last.has_next);
        assert!(last.has_prev);
    }

    #[test]
    fn test_pagination_result_empty() {
        let result: PaginationResult<i32> =
            PaginationResult::new(vec![], 0, PaginationParams::new(1, 10));
        assert_eq!(result.pages, 0);
        assert!(!result.has_next);
        assert!(!result.has_prev);
    }

    #[test]
    fn test_cursor_encode_decode() {
        let cursor = PageCursor::new(CursorValue::String("2024-01-01".to_string()), "row-9");
        let decoded = PageCursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded.id(), "row-9");
        assert_eq!(
            decoded.sort_value(),
            &CursorValue::String("2024-01-01".to_string())
        );
    }

    #[test]
    fn test_cursor_decode_invalid() {
        assert!(PageCursor::decode("not-valid-base64!!!").is_err());
        // Valid base64, not a cursor
        let garbage = URL_SAFE_NO_PAD.encode(b"{\"x\":1}");
        assert!(PageCursor::decode(&garbage).is_err());
    }

    #[test]
    fn test_cursor_value_sql_roundtrip() {
        let sql = SqlValue::Integer(42);
        let cursor: CursorValue = (&sql).into();
        assert_eq!(cursor.to_sql(), sql);
    }

    #[test]
    fn test_cursor_params_builder() {
        let params = CursorPaginationParams::new(25).with_cursor_field("created_at");
        assert_eq!(params.cursor_field, "created_at");
        assert!(params.cursor.is_none());
        assert!(params.validate().is_ok());
        assert!(CursorPaginationParams::new(0).validate().is_err());
    }
}
