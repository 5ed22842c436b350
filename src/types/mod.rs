//! Core data types: entities, values, query specifications, pagination.

pub mod entity;
pub mod pagination;
pub mod query;
pub mod value;

pub use entity::Entity;
pub use pagination::{
    CursorPaginationParams, CursorPaginationResult, CursorValue, PageCursor, PaginationConfig,
    PaginationParams, PaginationResult,
};
pub use query::{FilterOp, QueryFilter, QueryOptions, SortDirection, SortField};
pub use value::{Row, SqlValue};
