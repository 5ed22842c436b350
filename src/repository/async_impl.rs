//! Async repository frontend.
//!
//! A line-for-line mirror of the blocking [`Repository`](super::Repository)
//! over [`AsyncExecutor`]; the semantics live in the shared planner.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::{AsyncExecutor, Statement};
use crate::error::{RepoError, RepoResult};
use crate::paginate;
use crate::schema::EntitySchema;
use crate::tenant::TenantId;
use crate::types::entity::Entity;
use crate::types::pagination::{
    CursorPaginationParams, CursorPaginationResult, PaginationConfig, PaginationParams,
    PaginationResult,
};
use crate::types::query::QueryOptions;

use super::planner::QueryPlanner;
use super::sync::count_from_rows;

/// An async repository over one entity schema and one executor.
pub struct AsyncRepository<E> {
    executor: E,
    planner: QueryPlanner,
}

impl<E: AsyncExecutor> AsyncRepository<E> {
    /// Creates a repository over `schema`, scoped to `tenant` when the schema
    /// requires one.
    pub fn new(
        executor: E,
        schema: Arc<EntitySchema>,
        tenant: Option<TenantId>,
    ) -> RepoResult<Self> {
        Ok(Self {
            executor,
            planner: QueryPlanner::new(schema, tenant)?,
        })
    }

    /// Overrides the pagination tunables.
    pub fn with_pagination_config(mut self, config: PaginationConfig) -> Self {
        self.planner = self.planner.with_pagination_config(config);
        self
    }

    /// Sets the acting user recorded in audit stamps.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.planner = self.planner.with_actor(actor);
        self
    }

    /// Borrows the executor, for transaction and health plumbing.
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Consumes the repository, returning the executor.
    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Persists a new entity and returns it with identity and audit stamps
    /// filled in.
    pub async fn create(&mut self, data: Map<String, Value>) -> RepoResult<Entity> {
        let (stmt, entity) = self.planner.plan_insert(&data)?;
        self.executor.execute(&stmt).await?;
        debug!(entity = self.planner.entity_name(), id = %entity.id, "created");
        Ok(entity)
    }

    /// Fetches an entity by id, or `None` when absent, soft-deleted, or
    /// owned by another tenant.
    pub async fn get_by_id(&mut self, id: &str) -> RepoResult<Option<Entity>> {
        let stmt = self.planner.plan_get_by_id(id, false);
        self.fetch_optional(&stmt).await
    }

    /// Like [`get_by_id`](Self::get_by_id), but soft-deleted rows are
    /// returned too.
    pub async fn get_by_id_include_deleted(&mut self, id: &str) -> RepoResult<Option<Entity>> {
        let stmt = self.planner.plan_get_by_id(id, true);
        self.fetch_optional(&stmt).await
    }

    /// Fetches an entity by id, failing with [`RepoError::NotFound`] when
    /// absent.
    pub async fn get_by_id_or_raise(&mut self, id: &str) -> RepoResult<Entity> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| RepoError::not_found(self.planner.entity_name(), id))
    }

    /// Applies a partial update and returns the stored entity.
    pub async fn update(&mut self, id: &str, data: Map<String, Value>) -> RepoResult<Entity> {
        let stmt = self.planner.plan_update(id, &data)?;
        let affected = self.executor.execute(&stmt).await?;
        if affected == 0 {
            return Err(RepoError::not_found(self.planner.entity_name(), id));
        }
        self.get_by_id_or_raise(id).await
    }

    /// Soft-deletes an entity. Returns `false` when no live row matched.
    pub async fn delete(&mut self, id: &str) -> RepoResult<bool> {
        let stmt = self.planner.plan_soft_delete(id);
        let affected = self.executor.execute(&stmt).await?;
        debug!(entity = self.planner.entity_name(), id, affected, "soft delete");
        Ok(affected > 0)
    }

    /// Permanently removes an entity, soft-deleted or not. Returns `false`
    /// when no row matched.
    pub async fn hard_delete(&mut self, id: &str) -> RepoResult<bool> {
        let stmt = self.planner.plan_hard_delete(id);
        let affected = self.executor.execute(&stmt).await?;
        Ok(affected > 0)
    }

    /// Lists matching entities under the given filters and sort.
    ///
    /// A pagination strategy carried in the options windows the rows
    /// returned; use [`list_paginated`](Self::list_paginated) or
    /// [`cursor_paginate`](Self::cursor_paginate) when totals or a next
    /// cursor are needed.
    pub async fn list(&mut self, options: &QueryOptions) -> RepoResult<Vec<Entity>> {
        let stmt = self.planner.plan_select(options)?;
        self.fetch_all(&stmt).await
    }

    /// Counts matching entities.
    pub async fn count(&mut self, options: &QueryOptions) -> RepoResult<u64> {
        let stmt = self.planner.plan_count(options)?;
        let rows = self.executor.fetch(&stmt).await?;
        count_from_rows(&rows)
    }

    /// Fetches one offset page together with the total count.
    pub async fn list_paginated(
        &mut self,
        options: &QueryOptions,
        params: PaginationParams,
    ) -> RepoResult<PaginationResult<Entity>> {
        params.validate()?;
        let predicate = self.planner.query_predicate(options)?;
        let config = *self.planner.config();

        let total = self.resolve_total(&predicate, &config).await?;

        let items = if paginate::needs_seek(params, &options.sort, &config) {
            let sort_field = paginate::seek_sort_field(&options.sort);
            let boundary_stmt = paginate::plan_seek_boundary(
                self.planner.schema(),
                &predicate,
                &sort_field,
                params,
            )?;
            match self.executor.fetch(&boundary_stmt).await?.into_iter().next() {
                None => Vec::new(),
                Some(boundary) => {
                    let after = paginate::boundary_predicate(&boundary, &sort_field)?;
                    let stmt = paginate::plan_keyset_data(
                        self.planner.schema(),
                        &self.planner.select_columns(),
                        &predicate,
                        after,
                        &sort_field,
                        params.per_page,
                    )?;
                    self.fetch_all(&stmt).await?
                }
            }
        } else {
            let stmt = paginate::plan_offset_data(
                self.planner.schema(),
                &self.planner.select_columns(),
                &predicate,
                &options.sort,
                params,
            )?;
            self.fetch_all(&stmt).await?
        };

        Ok(PaginationResult::new(items, total, params))
    }

    /// Fetches one cursor page.
    pub async fn cursor_paginate(
        &mut self,
        options: &QueryOptions,
        params: &CursorPaginationParams,
    ) -> RepoResult<CursorPaginationResult<Entity>> {
        let predicate = self.planner.query_predicate(options)?;
        let sort_field = paginate::cursor_sort_field(params, &options.sort);
        let stmt = paginate::plan_cursor_page(
            self.planner.schema(),
            &self.planner.select_columns(),
            &predicate,
            params,
            &sort_field,
        )?;
        let rows = self.executor.fetch(&stmt).await?;
        let (rows, next_cursor, has_more) =
            paginate::split_cursor_rows(rows, params.limit, &params.cursor_field);
        let items = rows
            .iter()
            .map(|row| self.planner.decode_row(row))
            .collect::<RepoResult<Vec<_>>>()?;
        Ok(CursorPaginationResult {
            items,
            next_cursor,
            has_more,
        })
    }

    async fn resolve_total(
        &mut self,
        predicate: &crate::filter::Predicate,
        config: &PaginationConfig,
    ) -> RepoResult<u64> {
        // Store statistics are table-wide, so the estimate only stands in
        // when no predicate narrows the table.
        if predicate.is_empty()
            && let Some(estimate) = self
                .executor
                .approximate_row_count(self.planner.schema().table())
                .await?
            && estimate >= config.count_threshold
        {
            debug!(
                table = self.planner.schema().table(),
                estimate, "using approximate row count"
            );
            return Ok(estimate);
        }
        let stmt = paginate::plan_count(self.planner.schema().table(), predicate);
        let rows = self.executor.fetch(&stmt).await?;
        count_from_rows(&rows)
    }

    async fn fetch_optional(&mut self, stmt: &Statement) -> RepoResult<Option<Entity>> {
        let rows = self.executor.fetch(stmt).await?;
        rows.first().map(|row| self.planner.decode_row(row)).transpose()
    }

    async fn fetch_all(&mut self, stmt: &Statement) -> RepoResult<Vec<Entity>> {
        self.executor
            .fetch(stmt)
            .await?
            .iter()
            .map(|row| self.planner.decode_row(row))
            .collect()
    }
}
