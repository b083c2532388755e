//! Lazy, chainable queries
//!
//! A `QuerySet` describes a select: predicates, ordering and limit. Nothing
//! touches the wire until a materializing call (`all`, `first`, `count`,
//! `exists`, `delete`, `page`). Each result slot is filled at most once, so
//! repeated calls answer from the cache. A failed slot keeps its error.
//!
//! Chained calls return a new `QuerySet` with an empty cache. Predicates are
//! shared behind an `Arc` until a chained call changes them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::OnceCell;

use crate::schema::{Record, Row, SchemaModel, SchemaResult};
use crate::session::{AsyncSession, PageRequest, PagingState};
use crate::statement::{
    bind_predicate, build_count, build_delete, build_exists, build_select, explain, ExplainPlan,
    Predicate, PredicateSet, SelectStatement, SortSpec,
};

use super::engine::Engine;
use super::errors::{QueryError, QueryResult};
use super::sorter::RecordSorter;

/// One page of records and the token to resume after it
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// `None` when the store reports no more rows
    pub next: Option<String>,
}

type PageKey = (u32, Option<String>);

#[derive(Default)]
struct ResultCache {
    all: OnceCell<QueryResult<Vec<Record>>>,
    first: OnceCell<QueryResult<Option<Record>>>,
    count: OnceCell<QueryResult<u64>>,
    exists: OnceCell<QueryResult<bool>>,
    deleted: OnceCell<QueryResult<()>>,
    pages: Mutex<HashMap<PageKey, Arc<OnceCell<QueryResult<Page>>>>>,
}

impl ResultCache {
    fn page_slot(&self, key: PageKey) -> Arc<OnceCell<QueryResult<Page>>> {
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(pages.entry(key).or_default())
    }

    fn cached_all(&self) -> Option<&Vec<Record>> {
        match self.all.get() {
            Some(Ok(records)) => Some(records),
            _ => None,
        }
    }
}

/// A pending select over one shape
pub struct QuerySet<'e, S> {
    engine: &'e Engine<S>,
    schema: Arc<SchemaModel>,
    predicates: Arc<PredicateSet>,
    ordering: Option<SortSpec>,
    limit: Option<u32>,
    cache: Arc<ResultCache>,
}

impl<S> Clone for QuerySet<'_, S> {
    /// Clones share the result cache.
    fn clone(&self) -> Self {
        Self {
            engine: self.engine,
            schema: Arc::clone(&self.schema),
            predicates: Arc::clone(&self.predicates),
            ordering: self.ordering.clone(),
            limit: self.limit,
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<'e, S: AsyncSession> QuerySet<'e, S> {
    pub fn new(engine: &'e Engine<S>, schema: Arc<SchemaModel>) -> Self {
        Self {
            engine,
            schema,
            predicates: Arc::new(PredicateSet::new()),
            ordering: None,
            limit: None,
            cache: Arc::new(ResultCache::default()),
        }
    }

    pub fn schema(&self) -> &Arc<SchemaModel> {
        &self.schema
    }

    pub fn predicates(&self) -> &PredicateSet {
        &self.predicates
    }

    pub fn ordering(&self) -> Option<&SortSpec> {
        self.ordering.as_ref()
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    fn chained(
        &self,
        predicates: Arc<PredicateSet>,
        ordering: Option<SortSpec>,
        limit: Option<u32>,
    ) -> Self {
        Self {
            engine: self.engine,
            schema: Arc::clone(&self.schema),
            predicates,
            ordering,
            limit,
            cache: Arc::new(ResultCache::default()),
        }
    }

    // =========================================================================
    // Chained calls
    // =========================================================================

    /// Adds a predicate. The field must exist and the value must encode.
    pub fn filter(&self, predicate: Predicate) -> QueryResult<Self> {
        bind_predicate(&self.schema, &predicate)?;
        let mut predicates = (*self.predicates).clone();
        predicates.insert(predicate);
        Ok(self.chained(Arc::new(predicates), self.ordering.clone(), self.limit))
    }

    /// Adds a predicate written as `field__op`, e.g. `age__gte`.
    pub fn filter_lookup(&self, lookup: &str, value: Value) -> QueryResult<Self> {
        self.filter(Predicate::from_lookup(lookup, value)?)
    }

    /// Orders by a field; a leading `-` means descending.
    pub fn order_by(&self, spec: &str) -> Self {
        self.order_by_spec(SortSpec::parse(spec))
    }

    pub fn order_by_spec(&self, spec: SortSpec) -> Self {
        self.chained(Arc::clone(&self.predicates), Some(spec), self.limit)
    }

    pub fn limit(&self, limit: u32) -> Self {
        self.chained(Arc::clone(&self.predicates), self.ordering.clone(), Some(limit))
    }

    // =========================================================================
    // Statement shaping
    // =========================================================================

    fn sorts_client_side(&self, select: &SelectStatement) -> bool {
        self.ordering.is_some() && !select.ordering_pushed
    }

    /// The select `all` issues.
    ///
    /// A limit combined with a client-side ordering is applied after
    /// sorting, so the statement itself carries no limit.
    pub fn select_statement(&self) -> QueryResult<SelectStatement> {
        let select = build_select(
            &self.schema,
            &self.predicates,
            self.ordering.as_ref(),
            self.limit,
            None,
        )?;
        if self.limit.is_some() && self.sorts_client_side(&select) {
            return Ok(build_select(
                &self.schema,
                &self.predicates,
                self.ordering.as_ref(),
                None,
                None,
            )?);
        }
        Ok(select)
    }

    /// Describes what `all` would run, without touching the wire.
    pub fn explain(&self) -> QueryResult<ExplainPlan> {
        let select = self.select_statement()?;
        Ok(explain(self.schema.table(), &select, self.ordering.as_ref()))
    }

    fn decode(&self, rows: &[Row]) -> QueryResult<Vec<Record>> {
        rows.iter()
            .map(|row| Record::from_row(Arc::clone(&self.schema), row))
            .collect::<SchemaResult<Vec<_>>>()
            .map_err(QueryError::from)
    }

    async fn run_select(&self, select: &SelectStatement) -> QueryResult<Vec<Record>> {
        self.engine.report_warnings(self.schema.table(), select);
        let page = self.engine.execute(&select.statement).await?;
        self.decode(&page.rows)
    }

    // =========================================================================
    // Materializing calls (async)
    // =========================================================================

    pub async fn all_async(&self) -> QueryResult<Vec<Record>> {
        self.cache
            .all
            .get_or_init(|| self.fetch_all())
            .await
            .clone()
    }

    async fn fetch_all(&self) -> QueryResult<Vec<Record>> {
        let select = self.select_statement()?;
        let mut records = self.run_select(&select).await?;
        if let (Some(spec), true) = (&self.ordering, self.sorts_client_side(&select)) {
            RecordSorter::sort(&mut records, spec);
            if let Some(limit) = self.limit {
                records.truncate(limit as usize);
            }
        }
        Ok(records)
    }

    pub async fn first_async(&self) -> QueryResult<Option<Record>> {
        if let Some(records) = self.cache.cached_all() {
            return Ok(records.first().cloned());
        }
        self.cache
            .first
            .get_or_init(|| self.fetch_first())
            .await
            .clone()
    }

    async fn fetch_first(&self) -> QueryResult<Option<Record>> {
        let select = build_select(
            &self.schema,
            &self.predicates,
            self.ordering.as_ref(),
            Some(1),
            None,
        )?;
        if self.sorts_client_side(&select) {
            let records = self.all_async().await?;
            return Ok(records.into_iter().next());
        }
        let records = self.run_select(&select).await?;
        Ok(records.into_iter().next())
    }

    /// Matching rows, capped by the limit.
    pub async fn count_async(&self) -> QueryResult<u64> {
        if let Some(records) = self.cache.cached_all() {
            return Ok(records.len() as u64);
        }
        self.cache
            .count
            .get_or_init(|| self.fetch_count())
            .await
            .clone()
    }

    async fn fetch_count(&self) -> QueryResult<u64> {
        let statement = build_count(&self.schema, &self.predicates)?;
        let page = self.engine.execute(&statement).await?;
        let count = page
            .rows
            .first()
            .and_then(|row| row.values().next())
            .and_then(|value| value.as_i64())
            .ok_or_else(|| {
                QueryError::UnexpectedResult(format!(
                    "COUNT(*) on '{}' returned no counter",
                    self.schema.table()
                ))
            })?;
        let count = count.max(0) as u64;
        Ok(match self.limit {
            Some(limit) => count.min(u64::from(limit)),
            None => count,
        })
    }

    pub async fn exists_async(&self) -> QueryResult<bool> {
        if let Some(records) = self.cache.cached_all() {
            return Ok(!records.is_empty());
        }
        self.cache
            .exists
            .get_or_init(|| self.fetch_exists())
            .await
            .clone()
    }

    async fn fetch_exists(&self) -> QueryResult<bool> {
        let statement = build_exists(&self.schema, &self.predicates)?;
        let page = self.engine.execute(&statement).await?;
        Ok(!page.rows.is_empty())
    }

    /// Deletes every matching row. Needs a full partition-key restriction.
    pub async fn delete_async(&self) -> QueryResult<()> {
        self.cache
            .deleted
            .get_or_init(|| self.fetch_delete())
            .await
            .clone()
    }

    async fn fetch_delete(&self) -> QueryResult<()> {
        let statement = build_delete(&self.schema, &self.predicates)?;
        self.engine.execute(&statement).await?;
        Ok(())
    }

    /// One page of results.
    ///
    /// A `size` of 0 uses the configured default page size. Pass the previous
    /// page's `next` as `token` to resume. Client-side ordering applies
    /// within the page only.
    pub async fn page_async(&self, size: u32, token: Option<&str>) -> QueryResult<Page> {
        let size = if size == 0 {
            self.engine.config().default_page_size
        } else {
            size
        };
        let slot = self.cache.page_slot((size, token.map(str::to_string)));
        slot.get_or_init(|| self.fetch_page(size, token))
            .await
            .clone()
    }

    async fn fetch_page(&self, size: u32, token: Option<&str>) -> QueryResult<Page> {
        let unpaged = build_select(
            &self.schema,
            &self.predicates,
            self.ordering.as_ref(),
            self.limit,
            None,
        )?;
        let request = match token {
            None => PageRequest::first(size),
            Some(token) => {
                let state = PagingState::from_token(token).map_err(|source| {
                    QueryError::StatementExecutionFailure {
                        statement: unpaged.statement.cql.clone(),
                        source,
                    }
                })?;
                PageRequest::resume(size, state)
            }
        };

        let mut select = unpaged;
        select.statement = select.statement.with_paging(request);

        self.engine.report_warnings(self.schema.table(), &select);
        let result = self.engine.execute(&select.statement).await?;
        let mut records = self.decode(&result.rows)?;
        if let (Some(spec), true) = (&self.ordering, self.sorts_client_side(&select)) {
            RecordSorter::sort(&mut records, spec);
        }

        Ok(Page {
            records,
            next: result.paging_state.map(|state| state.to_token()),
        })
    }

    // =========================================================================
    // Materializing calls (blocking)
    // =========================================================================

    pub fn all(&self) -> QueryResult<Vec<Record>> {
        self.engine.block_on(self.all_async())?
    }

    pub fn first(&self) -> QueryResult<Option<Record>> {
        self.engine.block_on(self.first_async())?
    }

    pub fn count(&self) -> QueryResult<u64> {
        self.engine.block_on(self.count_async())?
    }

    pub fn exists(&self) -> QueryResult<bool> {
        self.engine.block_on(self.exists_async())?
    }

    pub fn delete(&self) -> QueryResult<()> {
        self.engine.block_on(self.delete_async())?
    }

    pub fn page(&self, size: u32, token: Option<&str>) -> QueryResult<Page> {
        self.engine.block_on(self.page_async(size, token))?
    }
}
