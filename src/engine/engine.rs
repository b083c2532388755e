//! Statement dispatch
//!
//! `Engine` owns the session, the configuration, the prepared-statement
//! cache and the metrics. Every statement the crate issues goes through
//! `dispatch`.
//!
//! The prepared cache lock is never held across an `.await`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::observability::{EngineMetrics, Event};
use crate::schema::{Entity, SchemaModel, SchemaResult, ShapeRegistry};
use crate::session::{AsyncSession, ExecutionResult, PreparedStatement, ResultPage};
use crate::statement::{BuildWarning, SelectStatement, Statement};

use super::errors::{QueryError, QueryResult};
use super::model::Model;
use super::queryset::QuerySet;

/// Async execution core shared by the blocking and non-blocking surfaces
pub struct Engine<S> {
    session: S,
    config: EngineConfig,
    registry: ShapeRegistry,
    prepared: Mutex<HashMap<String, PreparedStatement>>,
    metrics: Arc<EngineMetrics>,
    runtime: Option<Arc<Runtime>>,
}

impl<S: AsyncSession> Engine<S> {
    pub fn new(session: S, config: EngineConfig) -> Self {
        Self {
            session,
            config,
            registry: ShapeRegistry::new(),
            prepared: Mutex::new(HashMap::new()),
            metrics: Arc::new(EngineMetrics::new()),
            runtime: None,
        }
    }

    pub(crate) fn with_runtime(mut self, runtime: Arc<Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ShapeRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Model facade for a statically declared shape.
    pub fn model<E: Entity>(&self) -> SchemaResult<Model<'_, S>> {
        let schema = self.registry.shape::<E>()?;
        Ok(Model::new(self, schema))
    }

    /// Model facade for a dynamically declared shape.
    pub fn model_for(&self, schema: Arc<SchemaModel>) -> Model<'_, S> {
        Model::new(self, schema)
    }

    /// Unfiltered query over a shape.
    pub fn query(&self, schema: Arc<SchemaModel>) -> QuerySet<'_, S> {
        QuerySet::new(self, schema)
    }

    /// Runs a statement and wraps session failures with the statement text.
    pub async fn execute(&self, statement: &Statement) -> QueryResult<ResultPage> {
        self.dispatch(statement)
            .await
            .map_err(|source| QueryError::StatementExecutionFailure {
                statement: statement.cql.clone(),
                source,
            })
    }

    /// Hands a statement to the session.
    ///
    /// Statements are prepared when `prepare_statements` is set. Paged
    /// statements are always prepared since paging needs a prepared id.
    pub(crate) async fn dispatch(&self, statement: &Statement) -> ExecutionResult<ResultPage> {
        debug!(
            event = Event::StatementDispatched.as_str(),
            cql = %statement.cql,
            binds = statement.values.len(),
            paged = statement.paging.is_some(),
        );

        let result = if self.config.prepare_statements || statement.paging.is_some() {
            match self.prepared_for(&statement.cql).await {
                Ok(prepared) => {
                    self.session
                        .execute(&prepared, &statement.values, statement.paging.as_ref())
                        .await
                }
                Err(e) => Err(e),
            }
        } else {
            self.session
                .execute_unprepared(&statement.cql, &statement.values)
                .await
        };

        self.record_outcome(&statement.cql, &result);
        result
    }

    /// Runs schema-altering CQL unprepared.
    pub(crate) async fn dispatch_ddl(&self, cql: &str) -> ExecutionResult<ResultPage> {
        debug!(
            event = Event::StatementDispatched.as_str(),
            cql = %cql,
            binds = 0,
            paged = false,
        );
        let result = self.session.execute_unprepared(cql, &[]).await;
        self.record_outcome(cql, &result);
        result
    }

    fn record_outcome(&self, cql: &str, result: &ExecutionResult<ResultPage>) {
        match result {
            Ok(_) => self.metrics.increment_statements_executed(),
            Err(e) => {
                self.metrics.increment_statements_failed();
                warn!(
                    event = Event::StatementFailed.as_str(),
                    cql = %cql,
                    code = e.code(),
                    error = %e,
                );
            }
        }
    }

    fn cached(&self, cql: &str) -> Option<PreparedStatement> {
        self.prepared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cql)
            .cloned()
    }

    async fn prepared_for(&self, cql: &str) -> ExecutionResult<PreparedStatement> {
        if let Some(prepared) = self.cached(cql) {
            self.metrics.increment_prepared_hits();
            return Ok(prepared);
        }

        let prepared = self.session.prepare(cql).await?;
        debug!(event = Event::StatementPrepared.as_str(), cql = %cql, id = prepared.id);

        let mut cache = self.prepared.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cache
            .entry(cql.to_string())
            .or_insert(prepared)
            .clone())
    }

    /// Number of statements in the prepared cache
    pub fn prepared_len(&self) -> usize {
        self.prepared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Logs build warnings for a select about to run.
    pub(crate) fn report_warnings(&self, table: &str, select: &SelectStatement) {
        for warning in &select.warnings {
            match warning {
                BuildWarning::UnindexedFilter { field } => {
                    if self.config.warn_on_unindexed_filter {
                        self.metrics.increment_unindexed_filters();
                        warn!(
                            event = Event::UnindexedFilter.as_str(),
                            table = %table,
                            field = %field,
                            "filtering on a column with no key or index",
                        );
                    }
                }
                BuildWarning::OrderingNotPushable { field, reason } => {
                    warn!(
                        event = Event::OrderingNotPushable.as_str(),
                        table = %table,
                        field = %field,
                        reason = %reason,
                        "ordering applied client-side",
                    );
                }
            }
        }
    }

    /// Drives a future to completion on the blocking runtime.
    ///
    /// Fails with `Runtime` on an engine built for async use. Must not be
    /// called from inside another tokio runtime.
    pub fn block_on<F: Future>(&self, future: F) -> QueryResult<F::Output> {
        match &self.runtime {
            Some(runtime) => Ok(runtime.block_on(future)),
            None => Err(QueryError::Runtime(
                "blocking call on a non-blocking engine; use the _async form".to_string(),
            )),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.runtime.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CqlValue;
    use crate::session::{ExecutionError, MemorySession};

    #[tokio::test]
    async fn test_prepared_cache_reused() {
        let engine = Engine::new(MemorySession::new(), EngineConfig::default());
        let statement = Statement::new("SELECT id FROM t WHERE id = ?", vec![CqlValue::Int(1)]);

        engine.execute(&statement).await.unwrap();
        engine.execute(&statement).await.unwrap();

        assert_eq!(engine.session().prepared_count(), 1);
        assert_eq!(engine.prepared_len(), 1);
        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.statements_executed, 2);
        assert_eq!(snapshot.prepared_hits, 1);
    }

    #[tokio::test]
    async fn test_unprepared_mode() {
        let config = EngineConfig::default().with_prepare_statements(false);
        let engine = Engine::new(MemorySession::new(), config);
        engine
            .execute(&Statement::new("SELECT id FROM t", vec![]))
            .await
            .unwrap();

        assert_eq!(engine.session().prepared_count(), 0);
        assert!(!engine.session().executed()[0].prepared);
    }

    #[tokio::test]
    async fn test_failure_wrapped_with_statement() {
        let engine = Engine::new(MemorySession::new(), EngineConfig::default());
        engine
            .session()
            .fail_on("FROM t", ExecutionError::unavailable("down"));

        let err = engine
            .execute(&Statement::new("SELECT id FROM t", vec![]))
            .await
            .unwrap_err();
        match err {
            QueryError::StatementExecutionFailure { statement, source } => {
                assert_eq!(statement, "SELECT id FROM t");
                assert_eq!(source, ExecutionError::unavailable("down"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(engine.metrics().snapshot().statements_failed, 1);
    }

    #[tokio::test]
    async fn test_block_on_requires_runtime() {
        let engine = Engine::new(MemorySession::new(), EngineConfig::default());
        let err = engine.block_on(async { 1 }).unwrap_err();
        assert_eq!(err.code(), "CASSMAP_RUNTIME");
    }
}
