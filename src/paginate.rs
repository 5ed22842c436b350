//! Pagination engine: offset and cursor (keyset) strategies.
//!
//! This module is pure planning and assembly: it builds the statements and
//! interprets the fetched rows, while the repository frontends drive the
//! actual I/O. That keeps the strategies identical across the blocking and
//! async paths.
//!
//! Offset pages run an independent `COUNT` and data query; the two are not
//! guaranteed to observe the same snapshot, which is accepted behavior.
//! Cursor pages filter strictly past the last seen `(sort_value, id)` key,
//! which makes traversal stable under concurrent inserts and deletes outside
//! the current window.

use crate::core::Statement;
use crate::error::ValidationError;
use crate::filter::{Predicate, build_order_by};
use crate::schema::{COL_ID, EntitySchema};
use crate::types::pagination::{
    CursorPaginationParams, PageCursor, PaginationConfig, PaginationParams,
};
use crate::types::query::{SortDirection, SortField};
use crate::types::value::{Row, SqlValue};

/// Plans `SELECT COUNT(*)` under the given predicate.
pub fn plan_count(table: &str, predicate: &Predicate) -> Statement {
    Statement::new(
        format!("SELECT COUNT(*) AS n FROM {table}{}", predicate.where_clause()),
        predicate.params.clone(),
    )
}

/// Plans a plain `LIMIT/OFFSET` data query.
pub fn plan_offset_data(
    schema: &EntitySchema,
    select: &str,
    predicate: &Predicate,
    sort: &[SortField],
    params: PaginationParams,
) -> Result<Statement, ValidationError> {
    let order_by = build_order_by(schema, sort)?;
    let mut bound = predicate.params.clone();
    bound.push(SqlValue::Integer(params.per_page as i64));
    bound.push(SqlValue::Integer(params.offset() as i64));
    Ok(Statement::new(
        format!(
            "SELECT {select} FROM {}{}{order_by} LIMIT ? OFFSET ?",
            schema.table(),
            predicate.where_clause()
        ),
        bound,
    ))
}

/// Returns `true` when the requested offset is deep enough that the engine
/// should seek instead of scanning past `OFFSET` rows.
///
/// The boundary key covers a single sort column, so multi-key sorts keep the
/// plain `OFFSET` scan; a rewrite that dropped secondary keys would reorder
/// rows within ties.
pub fn needs_seek(params: PaginationParams, sort: &[SortField], config: &PaginationConfig) -> bool {
    sort.len() <= 1 && params.offset() >= config.deep_page_threshold && params.offset() > 0
}

/// The sort key the seek rewrite and cursor strategy compare on: the single
/// caller sort field, or the primary key.
pub fn seek_sort_field(sort: &[SortField]) -> SortField {
    sort.first().cloned().unwrap_or_else(|| SortField::asc(COL_ID))
}

/// Plans the boundary lookup for a seek rewrite: the `(sort_value, id)` key
/// of the last row before the requested page, fetched as a key-only query.
pub fn plan_seek_boundary(
    schema: &EntitySchema,
    predicate: &Predicate,
    sort_field: &SortField,
    params: PaginationParams,
) -> Result<Statement, ValidationError> {
    let order_by = build_order_by(schema, std::slice::from_ref(sort_field))?;
    let select = if sort_field.field == COL_ID {
        COL_ID.to_string()
    } else {
        format!("{}, {COL_ID}", sort_field.field)
    };
    let mut bound = predicate.params.clone();
    bound.push(SqlValue::Integer((params.offset() - 1) as i64));
    Ok(Statement::new(
        format!(
            "SELECT {select} FROM {}{}{order_by} LIMIT 1 OFFSET ?",
            schema.table(),
            predicate.where_clause()
        ),
        bound,
    ))
}

/// Builds the strictly-after keyset predicate relative to a boundary key.
///
/// The clause is parenthesized so it conjoins safely with the base predicate.
/// A NULL boundary sort value degrades to an id-only comparison within the
/// NULL group (see `CursorPaginationParams` docs).
pub fn keyset_predicate(
    sort_field: &SortField,
    sort_value: &SqlValue,
    id: &str,
) -> Predicate {
    let col = sort_field.field.as_str();
    let (cmp, id_cmp) = match sort_field.direction {
        SortDirection::Asc => (">", ">"),
        SortDirection::Desc => ("<", "<"),
    };

    if col == COL_ID {
        return Predicate {
            sql: format!("{COL_ID} {id_cmp} ?"),
            params: vec![SqlValue::Text(id.to_string())],
        };
    }

    if sort_value.is_null() {
        let sql = match sort_field.direction {
            // NULLs sort together; only the id advances inside the group.
            SortDirection::Asc => {
                format!("({col} IS NOT NULL OR ({col} IS NULL AND {COL_ID} {id_cmp} ?))")
            }
            SortDirection::Desc => format!("({col} IS NULL AND {COL_ID} {id_cmp} ?)"),
        };
        return Predicate {
            sql,
            params: vec![SqlValue::Text(id.to_string())],
        };
    }

    Predicate {
        sql: format!("({col} {cmp} ? OR ({col} = ? AND {COL_ID} {id_cmp} ?))"),
        params: vec![
            sort_value.clone(),
            sort_value.clone(),
            SqlValue::Text(id.to_string()),
        ],
    }
}

/// Builds the keyset predicate from a fetched boundary row.
pub fn boundary_predicate(
    row: &Row,
    sort_field: &SortField,
) -> Result<Predicate, ValidationError> {
    let id = row
        .get(COL_ID)
        .and_then(|v| v.as_text())
        .ok_or_else(|| ValidationError::InvalidPagination {
            message: "boundary row is missing its id".to_string(),
        })?
        .to_string();
    let sort_value = row
        .get(sort_field.field.as_str())
        .cloned()
        .unwrap_or(SqlValue::Null);
    Ok(keyset_predicate(sort_field, &sort_value, &id))
}

/// Plans the data query for a page positioned by a keyset predicate.
pub fn plan_keyset_data(
    schema: &EntitySchema,
    select: &str,
    base: &Predicate,
    after: Predicate,
    sort_field: &SortField,
    limit: u64,
) -> Result<Statement, ValidationError> {
    let predicate = base.clone().and(after);
    let order_by = build_order_by(schema, std::slice::from_ref(sort_field))?;
    let mut bound = predicate.params.clone();
    bound.push(SqlValue::Integer(limit as i64));
    Ok(Statement::new(
        format!(
            "SELECT {select} FROM {}{}{order_by} LIMIT ?",
            schema.table(),
            predicate.where_clause()
        ),
        bound,
    ))
}

/// Resolves the sort direction for a cursor traversal: the caller's sort
/// entry for the cursor field if present, ascending otherwise.
pub fn cursor_sort_field(
    params: &CursorPaginationParams,
    sort: &[SortField],
) -> SortField {
    sort.iter()
        .find(|s| s.field == params.cursor_field)
        .cloned()
        .unwrap_or_else(|| SortField::asc(&params.cursor_field))
}

/// Decodes the cursor token into its strictly-after predicate, or an empty
/// predicate for the first page.
pub fn cursor_predicate(
    params: &CursorPaginationParams,
    sort_field: &SortField,
) -> Result<Predicate, ValidationError> {
    match &params.cursor {
        Some(token) => {
            let cursor = PageCursor::decode(token)?;
            Ok(keyset_predicate(sort_field, &cursor.sort_value().to_sql(), cursor.id()))
        }
        None => Ok(Predicate::empty()),
    }
}

/// Plans a cursor page: `limit + 1` rows strictly past the cursor key (or
/// from the start for a null cursor), ordered by `(sort_field, id)`.
pub fn plan_cursor_page(
    schema: &EntitySchema,
    select: &str,
    base: &Predicate,
    params: &CursorPaginationParams,
    sort_field: &SortField,
) -> Result<Statement, ValidationError> {
    params.validate()?;
    schema.require_column(&params.cursor_field)?;

    let after = cursor_predicate(params, sort_field)?;
    plan_keyset_data(schema, select, base, after, sort_field, params.limit + 1)
}

/// Splits the fetched `limit + 1` rows into the page and the `has_more`
/// sentinel, and derives the next cursor from the last returned row.
///
/// Returns `(rows, next_cursor, has_more)`; the caller decodes the rows.
pub fn split_cursor_rows(
    mut rows: Vec<Row>,
    limit: u64,
    cursor_field: &str,
) -> (Vec<Row>, Option<String>, bool) {
    let has_more = rows.len() as u64 > limit;
    if has_more {
        rows.truncate(limit as usize);
    }
    let next_cursor = if has_more {
        rows.last().map(|row| {
            let sort_value = row.get(cursor_field).cloned().unwrap_or(SqlValue::Null);
            let id = row
                .get(COL_ID)
                .and_then(|v| v.as_text().map(String::from))
                .unwrap_or_default();
            PageCursor::new((&sort_value).into(), id).encode()
        })
    } else {
        None
    };
    (rows, next_cursor, has_more)
}
