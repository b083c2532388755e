//! Collection Mutation Tests
//!
//! Read-free add/remove deltas on list, set and map columns.

use cassmap::schema::{CqlValue, Entity, FieldDef, FieldKind};
use cassmap::statement::{build_collection_delta, Predicate, StatementError};
use cassmap::sync::SyncMode;
use cassmap::{Engine, EngineConfig, MemorySession, QueryError};
use indexmap::IndexMap;
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

struct Article;

impl Entity for Article {
    const TABLE: &'static str = "articles";

    fn fields() -> Vec<(&'static str, FieldDef)> {
        vec![
            ("id", FieldDef::int().partition_key()),
            ("title", FieldDef::text()),
            ("tags", FieldDef::set(FieldKind::Text)),
            ("history", FieldDef::list(FieldKind::Int)),
            ("counts", FieldDef::map(FieldKind::Text, FieldKind::Int)),
        ]
    }
}

fn key(id: i64) -> IndexMap<String, Value> {
    let mut key = IndexMap::new();
    key.insert("id".to_string(), json!(id));
    key
}

async fn engine_with_article() -> Engine<MemorySession> {
    let engine = Engine::new(
        MemorySession::new(),
        EngineConfig::default().with_keyspace("cms"),
    );
    let articles = engine.model::<Article>().unwrap();
    articles.sync_table_async(SyncMode::Apply).await.unwrap();
    articles
        .create_async(json!({
            "id": 1,
            "title": "intro",
            "tags": ["c", "d"],
            "history": [1],
            "counts": {"views": 3},
        }))
        .await
        .unwrap();
    engine
}

async fn fetch(engine: &Engine<MemorySession>) -> cassmap::Record {
    engine
        .model::<Article>()
        .unwrap()
        .get_async(json!({"id": 1}))
        .await
        .unwrap()
        .unwrap()
}

// =============================================================================
// Statement Shape
// =============================================================================

#[test]
fn test_delta_with_additions_and_removals() {
    let engine = Engine::new(MemorySession::new(), EngineConfig::default());
    let schema = engine.registry().shape::<Article>().unwrap();

    let statement =
        build_collection_delta(&schema, "tags", &json!(["a", "b"]), &json!(["c"]), &key(1))
            .unwrap();

    assert_eq!(
        statement.cql,
        "UPDATE articles SET tags = tags + ?, tags = tags - ? WHERE id = ?"
    );
    assert_eq!(
        statement.values,
        vec![
            CqlValue::Set(vec!["a".into(), "b".into()]),
            CqlValue::Set(vec!["c".into()]),
            CqlValue::Int(1),
        ]
    );
}

#[test]
fn test_delta_rejects_scalars_and_empty_deltas() {
    let engine = Engine::new(MemorySession::new(), EngineConfig::default());
    let schema = engine.registry().shape::<Article>().unwrap();

    let err = build_collection_delta(&schema, "title", &json!(["x"]), &Value::Null, &key(1))
        .unwrap_err();
    assert!(matches!(err, StatementError::NotACollection { .. }));

    let err =
        build_collection_delta(&schema, "tags", &json!([]), &Value::Null, &key(1)).unwrap_err();
    assert!(matches!(err, StatementError::EmptyDelta { .. }));

    let err = build_collection_delta(&schema, "tags", &json!([1]), &Value::Null, &key(1))
        .unwrap_err();
    assert_eq!(err.code(), "CASSMAP_TYPE_MISMATCH");
}

// =============================================================================
// Applied Deltas
// =============================================================================

#[tokio::test]
async fn test_set_delta_applies() {
    let engine = engine_with_article().await;
    engine
        .model::<Article>()
        .unwrap()
        .update_collection_async(json!({"id": 1}), "tags", json!(["a", "b"]), json!(["c"]))
        .await
        .unwrap();

    let article = fetch(&engine).await;
    assert_eq!(article.get("tags"), Some(&json!(["a", "b", "d"])));
    assert_eq!(engine.session().count_executed("UPDATE articles SET tags"), 1);
}

#[tokio::test]
async fn test_list_append_keeps_duplicates() {
    let engine = engine_with_article().await;
    engine
        .model::<Article>()
        .unwrap()
        .update_collection_async(json!({"id": 1}), "history", json!([1, 2]), Value::Null)
        .await
        .unwrap();

    let article = fetch(&engine).await;
    assert_eq!(article.get("history"), Some(&json!([1, 1, 2])));
}

#[tokio::test]
async fn test_map_delta_removes_by_key() {
    let engine = engine_with_article().await;
    engine
        .model::<Article>()
        .unwrap()
        .update_collection_async(
            json!({"id": 1}),
            "counts",
            json!({"likes": 7}),
            json!(["views"]),
        )
        .await
        .unwrap();

    let article = fetch(&engine).await;
    assert_eq!(article.get("counts"), Some(&json!({"likes": 7})));
}

#[tokio::test]
async fn test_removing_everything_reads_back_empty() {
    let engine = engine_with_article().await;
    engine
        .model::<Article>()
        .unwrap()
        .update_collection_async(json!({"id": 1}), "tags", Value::Null, json!(["c", "d"]))
        .await
        .unwrap();

    let article = fetch(&engine).await;
    assert_eq!(article.get("tags"), Some(&json!([])));

    // an emptied set still matches nothing on CONTAINS
    let tagged = engine
        .model::<Article>()
        .unwrap()
        .filter(Predicate::contains("tags", json!("c")))
        .unwrap()
        .exists_async()
        .await
        .unwrap();
    assert!(!tagged);
}

#[tokio::test]
async fn test_delta_needs_full_primary_key() {
    let engine = engine_with_article().await;
    let err = engine
        .model::<Article>()
        .unwrap()
        .update_collection_async(json!({}), "tags", json!(["z"]), Value::Null)
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::Statement(_)));
    assert_eq!(engine.session().count_executed("UPDATE"), 0);
}
