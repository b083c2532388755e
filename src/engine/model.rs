//! Model facade
//!
//! CRUD surface over one shape. Every operation has a blocking form and an
//! `_async` form; the blocking form drives the async one on the engine's
//! runtime.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::schema::{Record, SchemaError, SchemaModel};
use crate::session::AsyncSession;
use crate::statement::{build_collection_delta, build_insert, build_update, Predicate};
use crate::sync::{SchemaSynchronizer, SyncMode, SyncPlan};

use super::batch::{self, BatchReport};
use super::engine::Engine;
use super::errors::{QueryError, QueryResult};
use super::queryset::QuerySet;

/// Operations on one table
pub struct Model<'e, S> {
    engine: &'e Engine<S>,
    schema: Arc<SchemaModel>,
}

impl<S> Clone for Model<'_, S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine,
            schema: Arc::clone(&self.schema),
        }
    }
}

/// Reads a JSON object into a column map.
fn object_arg(label: &str, value: Value) -> QueryResult<IndexMap<String, Value>> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(SchemaError::type_mismatch(label, "object", other.to_string()).into()),
    }
}

impl<'e, S: AsyncSession> Model<'e, S> {
    pub fn new(engine: &'e Engine<S>, schema: Arc<SchemaModel>) -> Self {
        Self { engine, schema }
    }

    pub fn schema(&self) -> &Arc<SchemaModel> {
        &self.schema
    }

    pub fn table(&self) -> &str {
        self.schema.table()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn all(&self) -> QuerySet<'e, S> {
        QuerySet::new(self.engine, Arc::clone(&self.schema))
    }

    pub fn filter(&self, predicate: Predicate) -> QueryResult<QuerySet<'e, S>> {
        self.all().filter(predicate)
    }

    pub fn filter_lookup(&self, lookup: &str, value: Value) -> QueryResult<QuerySet<'e, S>> {
        self.all().filter_lookup(lookup, value)
    }

    /// Query restricted by equality on every entry of a JSON object.
    fn by_key(&self, key: Value) -> QueryResult<QuerySet<'e, S>> {
        let mut query = self.all();
        for (field, value) in object_arg("$key", key)? {
            query = query.filter(Predicate::eq(field, value))?;
        }
        Ok(query)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Validates data into a record without writing it.
    pub fn build(&self, data: Value) -> QueryResult<Record> {
        Ok(Record::new(Arc::clone(&self.schema), data)?)
    }

    pub async fn create_async(&self, data: Value) -> QueryResult<Record> {
        let record = self.build(data)?;
        self.save_async(&record).await?;
        Ok(record)
    }

    /// Writes every column of the record (an upsert).
    pub async fn save_async(&self, record: &Record) -> QueryResult<()> {
        let statement = build_insert(&self.schema, record)?;
        self.engine.execute(&statement).await?;
        Ok(())
    }

    /// Fetches the single row matching `key`.
    ///
    /// `key` is a JSON object of field values. Returns `None` when nothing
    /// matches and `MultipleRowsReturned` when more than one row does.
    pub async fn get_async(&self, key: Value) -> QueryResult<Option<Record>> {
        let mut records = self.by_key(key)?.all_async().await?;
        match records.len() {
            0 => Ok(None),
            1 => Ok(records.pop()),
            count => Err(QueryError::MultipleRowsReturned {
                table: self.schema.table().to_string(),
                count,
            }),
        }
    }

    /// Partial update addressed by the full primary key.
    pub async fn update_async(&self, key: Value, changes: Value) -> QueryResult<()> {
        let key = object_arg("$key", key)?;
        let changes = object_arg("$changes", changes)?;
        let statement = build_update(&self.schema, &key, &changes)?;
        self.engine.execute(&statement).await?;
        Ok(())
    }

    /// Deletes the row a record addresses.
    pub async fn delete_async(&self, record: &Record) -> QueryResult<()> {
        let mut query = self.all();
        for (field, value) in record.key_values() {
            query = query.filter(Predicate::eq(field, value))?;
        }
        query.delete_async().await
    }

    /// Atomic add/remove on a collection column.
    ///
    /// Either side may be null or empty, not both. For maps, `removals` is a
    /// list of keys.
    pub async fn update_collection_async(
        &self,
        key: Value,
        field: &str,
        additions: Value,
        removals: Value,
    ) -> QueryResult<()> {
        let key = object_arg("$key", key)?;
        let statement =
            build_collection_delta(&self.schema, field, &additions, &removals, &key)?;
        self.engine.execute(&statement).await?;
        Ok(())
    }

    /// Validates every item, then inserts them in unlogged batches.
    pub async fn bulk_create_async(&self, items: Vec<Value>) -> QueryResult<BatchReport> {
        let records = self.build_all(items)?;
        batch::bulk_insert_async(self.engine, &self.schema, &records).await
    }

    fn build_all(&self, items: Vec<Value>) -> QueryResult<Vec<Record>> {
        items.into_iter().map(|item| self.build(item)).collect()
    }

    /// Reconciles the remote table with this shape.
    pub async fn sync_table_async(&self, mode: SyncMode) -> QueryResult<SyncPlan> {
        Ok(SchemaSynchronizer::sync_async(self.engine, &self.schema, mode).await?)
    }

    // =========================================================================
    // Blocking forms
    // =========================================================================

    pub fn create(&self, data: Value) -> QueryResult<Record> {
        self.engine.block_on(self.create_async(data))?
    }

    pub fn save(&self, record: &Record) -> QueryResult<()> {
        self.engine.block_on(self.save_async(record))?
    }

    pub fn get(&self, key: Value) -> QueryResult<Option<Record>> {
        self.engine.block_on(self.get_async(key))?
    }

    pub fn update(&self, key: Value, changes: Value) -> QueryResult<()> {
        self.engine.block_on(self.update_async(key, changes))?
    }

    pub fn delete(&self, record: &Record) -> QueryResult<()> {
        self.engine.block_on(self.delete_async(record))?
    }

    pub fn update_collection(
        &self,
        key: Value,
        field: &str,
        additions: Value,
        removals: Value,
    ) -> QueryResult<()> {
        self.engine
            .block_on(self.update_collection_async(key, field, additions, removals))?
    }

    /// Batches run one at a time.
    pub fn bulk_create(&self, items: Vec<Value>) -> QueryResult<BatchReport> {
        let records = self.build_all(items)?;
        batch::bulk_insert(self.engine, &self.schema, &records)
    }

    pub fn sync_table(&self, mode: SyncMode) -> QueryResult<SyncPlan> {
        self.engine.block_on(self.sync_table_async(mode))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::schema::{Entity, FieldDef, FieldKind};
    use crate::session::MemorySession;
    use serde_json::json;

    struct Note;

    impl Entity for Note {
        const TABLE: &'static str = "notes";

        fn fields() -> Vec<(&'static str, FieldDef)> {
            vec![
                ("id", FieldDef::uuid().primary_key()),
                ("title", FieldDef::text().required()),
                ("tags", FieldDef::set(FieldKind::Text)),
            ]
        }
    }

    fn engine() -> Engine<MemorySession> {
        Engine::new(
            MemorySession::new(),
            EngineConfig::default().with_keyspace("app"),
        )
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let engine = engine();
        let notes = engine.model::<Note>().unwrap();
        notes.sync_table_async(SyncMode::Apply).await.unwrap();

        let created = notes.create_async(json!({"title": "first"})).await.unwrap();
        let id = created.get("id").cloned().unwrap();
        assert_eq!(created.get("tags"), Some(&json!([])));

        notes
            .update_async(json!({"id": id}), json!({"title": "renamed"}))
            .await
            .unwrap();
        let fetched = notes.get_async(json!({"id": id})).await.unwrap().unwrap();
        assert_eq!(fetched.get("title"), Some(&json!("renamed")));

        notes.delete_async(&fetched).await.unwrap();
        assert!(notes.get_async(json!({"id": id})).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_multiple_rows() {
        let engine = engine();
        let notes = engine.model::<Note>().unwrap();
        notes.sync_table_async(SyncMode::Apply).await.unwrap();
        notes.create_async(json!({"title": "same"})).await.unwrap();
        notes.create_async(json!({"title": "same"})).await.unwrap();

        let err = notes.get_async(json!({"title": "same"})).await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::MultipleRowsReturned { count: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_build_rejects_missing_required() {
        let engine = engine();
        let notes = engine.model::<Note>().unwrap();
        let err = notes.create_async(json!({"tags": ["a"]})).await.unwrap_err();
        assert_eq!(err.code(), "CASSMAP_MISSING_REQUIRED");
        assert!(engine.session().executed().is_empty());
    }

    #[tokio::test]
    async fn test_key_must_be_object() {
        let engine = engine();
        let notes = engine.model::<Note>().unwrap();
        let err = notes.get_async(json!("not-an-object")).await.unwrap_err();
        assert_eq!(err.code(), "CASSMAP_TYPE_MISMATCH");
    }

    #[test]
    fn test_blocking_forms_need_blocking_engine() {
        let engine = engine();
        let notes = engine.model::<Note>().unwrap();
        let err = notes.create(json!({"title": "x"})).unwrap_err();
        assert_eq!(err.code(), "CASSMAP_RUNTIME");
    }
}
