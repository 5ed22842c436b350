//! Filter engine: structured filters to parameterized SQL predicates.
//!
//! Every caller-supplied value is bound as a query parameter; the only text
//! spliced into SQL is a column name that has already passed the schema
//! whitelist. Unknown fields and operator/value mismatches fail validation
//! before any query executes.

use serde_json::Value;

use crate::error::ValidationError;
use crate::schema::{COL_ID, EntitySchema, FieldType};
use crate::types::query::{FilterOp, QueryFilter, SortDirection, SortField};
use crate::types::value::SqlValue;

/// A parameterized SQL fragment: clause text with `?` placeholders plus the
/// values bound to them, in order.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    /// Clause text. Empty when no filters apply.
    pub sql: String,
    /// Bound values, one per placeholder.
    pub params: Vec<SqlValue>,
}

impl Predicate {
    /// An always-true predicate with no clause text.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if no clause text was produced.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Conjoins another predicate onto this one.
    pub fn and(mut self, other: Predicate) -> Self {
        if other.sql.is_empty() {
            return self;
        }
        if self.sql.is_empty() {
            return other;
        }
        self.sql = format!("{} AND {}", self.sql, other.sql);
        self.params.extend(other.params);
        self
    }

    /// Renders as a `WHERE ...` clause, or nothing when empty.
    pub fn where_clause(&self) -> String {
        if self.sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

/// Escapes literal `%`, `_`, and `\` so caller input matches literally inside
/// a LIKE pattern.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn scalar_param(
    field: &str,
    field_type: FieldType,
    op: FilterOp,
    value: &Value,
) -> Result<SqlValue, ValidationError> {
    if value.is_null() {
        return Err(ValidationError::OperatorMismatch {
            field: field.to_string(),
            operator: op.name().to_string(),
            expected: "a non-null scalar value".to_string(),
        });
    }
    SqlValue::coerce(field, field_type, value)
}

fn clause_for(schema: &EntitySchema, filter: &QueryFilter) -> Result<Predicate, ValidationError> {
    let field_type = schema.require_column(&filter.field)?;
    let col = filter.field.as_str();

    let predicate = match filter.op {
        FilterOp::Eq | FilterOp::Ne | FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let sym = match filter.op {
                FilterOp::Eq => "=",
                FilterOp::Ne => "!=",
                FilterOp::Gt => ">",
                FilterOp::Gte => ">=",
                FilterOp::Lt => "<",
                _ => "<=",
            };
            Predicate {
                sql: format!("{col} {sym} ?"),
                params: vec![scalar_param(col, field_type, filter.op, &filter.value)?],
            }
        }
        FilterOp::In | FilterOp::NotIn => {
            let items = filter
                .value
                .as_array()
                .ok_or_else(|| ValidationError::OperatorMismatch {
                    field: col.to_string(),
                    operator: filter.op.name().to_string(),
                    expected: "a sequence of values".to_string(),
                })?;
            if items.is_empty() {
                // IN () matches nothing; NOT IN () matches everything.
                let sql = if filter.op == FilterOp::In { "1 = 0" } else { "1 = 1" };
                return Ok(Predicate {
                    sql: sql.to_string(),
                    params: Vec::new(),
                });
            }
            let params = items
                .iter()
                .map(|v| scalar_param(col, field_type, filter.op, v))
                .collect::<Result<Vec<_>, _>>()?;
            let placeholders = vec!["?"; params.len()].join(", ");
            let keyword = if filter.op == FilterOp::In { "IN" } else { "NOT IN" };
            Predicate {
                sql: format!("{col} {keyword} ({placeholders})"),
                params,
            }
        }
        FilterOp::Like | FilterOp::Ilike => {
            let needle = filter
                .value
                .as_str()
                .ok_or_else(|| ValidationError::OperatorMismatch {
                    field: col.to_string(),
                    operator: filter.op.name().to_string(),
                    expected: "a string value".to_string(),
                })?;
            let pattern = format!("%{}%", escape_like(needle));
            let sql = if filter.op == FilterOp::Like {
                format!("{col} LIKE ? ESCAPE '\\'")
            } else {
                // Emitted via LOWER so the same SQL runs on SQLite and Postgres.
                format!("LOWER({col}) LIKE LOWER(?) ESCAPE '\\'")
            };
            Predicate {
                sql,
                params: vec![SqlValue::Text(pattern)],
            }
        }
        FilterOp::IsNull => Predicate {
            sql: format!("{col} IS NULL"),
            params: Vec::new(),
        },
        FilterOp::IsNotNull => Predicate {
            sql: format!("{col} IS NOT NULL"),
            params: Vec::new(),
        },
        FilterOp::Between => {
            let bounds = filter
                .value
                .as_array()
                .filter(|a| a.len() == 2)
                .ok_or_else(|| ValidationError::OperatorMismatch {
                    field: col.to_string(),
                    operator: filter.op.name().to_string(),
                    expected: "a two-element [low, high] range".to_string(),
                })?;
            let low = scalar_param(col, field_type, filter.op, &bounds[0])?;
            let high = scalar_param(col, field_type, filter.op, &bounds[1])?;
            Predicate {
                sql: format!("{col} BETWEEN ? AND ?"),
                params: vec![low, high],
            }
        }
    };
    Ok(predicate)
}

/// Builds a single conjunctive predicate from a filter list.
///
/// Validation happens here in full: every filter either contributes a
/// parameterized clause or the whole build fails.
pub fn build_predicate(
    schema: &EntitySchema,
    filters: &[QueryFilter],
) -> Result<Predicate, ValidationError> {
    let mut predicate = Predicate::empty();
    for filter in filters {
        predicate = predicate.and(clause_for(schema, filter)?);
    }
    Ok(predicate)
}

/// Builds an `ORDER BY` clause from validated sort keys.
///
/// The primary key is always appended as a final tie-breaker (in the
/// direction of the last caller key, so keyset predicates stay
/// lexicographic), which cursor pagination relies on for correctness.
pub fn build_order_by(
    schema: &EntitySchema,
    sort: &[SortField],
) -> Result<String, ValidationError> {
    let mut keys = Vec::with_capacity(sort.len() + 1);
    let mut last_direction = SortDirection::Asc;
    let mut saw_id = false;
    for key in sort {
        schema.require_column(&key.field)?;
        keys.push(format!("{} {}", key.field, key.direction.sql()));
        last_direction = key.direction;
        saw_id |= key.field == COL_ID;
    }
    if !saw_id {
        keys.push(format!("{COL_ID} {}", last_direction.sql()));
    }
    Ok(format!(" ORDER BY {}", keys.join(", ")))
}
