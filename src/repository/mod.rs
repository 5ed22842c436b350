//! Generic repository: CRUD, tenant isolation, querying, pagination.
//!
//! The repository is generic over the entity schema, not over a Rust type per
//! table: one [`Repository`] (or [`AsyncRepository`]) serves any entity
//! described by an [`EntitySchema`](crate::schema::EntitySchema). Planning
//! lives in [`QueryPlanner`], which both frontends share.

mod async_impl;
mod planner;
mod sync;

pub use async_impl::AsyncRepository;
pub use planner::QueryPlanner;
pub use sync::Repository;
