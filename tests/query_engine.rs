//! Query Engine Tests
//!
//! Pending queries against the in-memory session:
//! - Statement text is deterministic
//! - `first` asks the store for a single row
//! - A materialized query answers repeats from its cache
//! - Paging tokens walk a result set to its end
//! - The blocking surface matches the async one

use cassmap::schema::{ClusteringOrder, CqlValue, Entity, FieldDef};
use cassmap::statement::{build_select, OrderingMode, Predicate, PredicateSet, SortSpec};
use cassmap::sync::SyncMode;
use cassmap::{BlockingEngine, Engine, EngineConfig, MemorySession};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

struct Reading;

impl Entity for Reading {
    const TABLE: &'static str = "readings";

    fn fields() -> Vec<(&'static str, FieldDef)> {
        vec![
            ("sensor", FieldDef::text().partition_key()),
            ("seq", FieldDef::int().clustering_key(ClusteringOrder::Asc)),
            ("value", FieldDef::double()),
            ("label", FieldDef::text()),
        ]
    }
}

fn config() -> EngineConfig {
    EngineConfig::default().with_keyspace("metrics")
}

async fn seeded_engine(rows: i32) -> Engine<MemorySession> {
    let engine = Engine::new(MemorySession::new(), config());
    let readings = engine.model::<Reading>().unwrap();
    readings.sync_table_async(SyncMode::Apply).await.unwrap();
    for seq in 1..=rows {
        readings
            .create_async(json!({
                "sensor": "s1",
                "seq": seq,
                "value": f64::from(seq) * 1.5,
                "label": if seq % 2 == 0 { "even" } else { "odd" },
            }))
            .await
            .unwrap();
    }
    engine.session().clear_executed();
    engine
}

fn seqs(records: &[cassmap::Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.get("seq").and_then(Value::as_i64))
        .collect()
}

// =============================================================================
// Statement Determinism
// =============================================================================

#[test]
fn test_build_select_is_deterministic() {
    let engine = Engine::new(MemorySession::new(), config());
    let schema = engine.registry().shape::<Reading>().unwrap();
    let predicates: PredicateSet = vec![
        Predicate::eq("sensor", json!("s1")),
        Predicate::gte("seq", json!(2)),
    ]
    .into_iter()
    .collect();
    let order = SortSpec::desc("seq");

    let first = build_select(&schema, &predicates, Some(&order), Some(10), None).unwrap();
    let second = build_select(&schema, &predicates, Some(&order), Some(10), None).unwrap();

    assert_eq!(first.statement.cql, second.statement.cql);
    assert_eq!(first.statement.values, second.statement.values);
    assert_eq!(
        first.statement.cql,
        "SELECT sensor, seq, value, label FROM readings WHERE sensor = ? AND seq >= ? ORDER BY seq DESC LIMIT ?"
    );
}

// =============================================================================
// Materializing Calls
// =============================================================================

#[tokio::test]
async fn test_first_issues_limit_one() {
    let engine = seeded_engine(3).await;
    let readings = engine.model::<Reading>().unwrap();

    let first = readings
        .filter(Predicate::eq("sensor", json!("s1")))
        .unwrap()
        .first_async()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.get("seq"), Some(&json!(1)));

    let executed = engine.session().executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].cql.ends_with("LIMIT ?"));
    assert_eq!(executed[0].values.last(), Some(&CqlValue::Int(1)));
}

#[tokio::test]
async fn test_second_materialization_uses_cache() {
    let engine = seeded_engine(4).await;
    let query = engine
        .model::<Reading>()
        .unwrap()
        .filter(Predicate::eq("sensor", json!("s1")))
        .unwrap();

    let first = query.all_async().await.unwrap();
    let second = query.all_async().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(query.count_async().await.unwrap(), 4);
    assert!(query.exists_async().await.unwrap());

    assert_eq!(engine.session().executed().len(), 1);
}

#[tokio::test]
async fn test_count_and_exists_use_specialized_selects() {
    let engine = seeded_engine(3).await;
    let readings = engine.model::<Reading>().unwrap();

    let query = readings.filter(Predicate::eq("sensor", json!("s1"))).unwrap();
    assert_eq!(query.count_async().await.unwrap(), 3);
    assert!(query.exists_async().await.unwrap());

    let missing = readings.filter(Predicate::eq("sensor", json!("s9"))).unwrap();
    assert!(!missing.exists_async().await.unwrap());

    let cql = engine.session().executed_cql();
    assert!(cql[0].starts_with("SELECT COUNT(*) FROM readings"));
    assert!(cql[1].starts_with("SELECT sensor FROM readings"));
}

#[tokio::test]
async fn test_range_and_ordering() {
    let engine = seeded_engine(5).await;
    let readings = engine.model::<Reading>().unwrap();

    let records = readings
        .filter(Predicate::eq("sensor", json!("s1")))
        .unwrap()
        .filter_lookup("seq__gt", json!(2))
        .unwrap()
        .order_by("-seq")
        .all_async()
        .await
        .unwrap();
    assert_eq!(seqs(&records), vec![5, 4, 3]);
}

#[tokio::test]
async fn test_client_side_ordering_applies_limit_after_sort() {
    let engine = seeded_engine(5).await;
    let query = engine
        .model::<Reading>()
        .unwrap()
        .filter(Predicate::eq("sensor", json!("s1")))
        .unwrap()
        .order_by("-value")
        .limit(2);

    assert_eq!(
        query.explain().unwrap().ordering,
        OrderingMode::Client
    );
    let records = query.all_async().await.unwrap();
    assert_eq!(seqs(&records), vec![5, 4]);
}

#[tokio::test]
async fn test_in_on_partition_key_orders_client_side() {
    let engine = seeded_engine(4).await;
    let query = engine
        .model::<Reading>()
        .unwrap()
        .filter(Predicate::is_in("sensor", vec![json!("s1"), json!("s2")]))
        .unwrap()
        .order_by("-seq");

    assert_eq!(query.explain().unwrap().ordering, OrderingMode::Client);
    let records = query.all_async().await.unwrap();
    assert_eq!(seqs(&records), vec![4, 3, 2, 1]);
    assert!(!engine.session().executed_cql()[0].contains("ORDER BY"));
}

#[tokio::test]
async fn test_conflicting_partition_operators_rejected() {
    let engine = seeded_engine(2).await;
    let err = engine
        .model::<Reading>()
        .unwrap()
        .filter(Predicate::eq("sensor", json!("s1")))
        .unwrap()
        .filter_lookup("sensor__gt", json!("a"))
        .unwrap()
        .all_async()
        .await
        .unwrap_err();

    assert_eq!(err.code(), "CASSMAP_INVALID_OPERATOR");
    assert!(engine.session().executed().is_empty());
}

#[tokio::test]
async fn test_unindexed_filter_still_runs() {
    let engine = seeded_engine(4).await;
    let records = engine
        .model::<Reading>()
        .unwrap()
        .filter(Predicate::eq("label", json!("even")))
        .unwrap()
        .all_async()
        .await
        .unwrap();

    assert_eq!(seqs(&records), vec![2, 4]);
    assert_eq!(engine.metrics().snapshot().unindexed_filters, 1);
    assert!(engine.session().executed_cql()[0].ends_with("ALLOW FILTERING"));
}

#[tokio::test]
async fn test_query_delete_removes_partition() {
    let engine = seeded_engine(3).await;
    let readings = engine.model::<Reading>().unwrap();
    readings
        .filter(Predicate::eq("sensor", json!("s1")))
        .unwrap()
        .delete_async()
        .await
        .unwrap();

    assert!(engine.session().rows("readings").is_empty());
}

// =============================================================================
// Paging
// =============================================================================

#[tokio::test]
async fn test_paging_walks_five_rows() {
    let engine = seeded_engine(5).await;
    let query = engine.model::<Reading>().unwrap().all();

    let page1 = query.page_async(2, None).await.unwrap();
    assert_eq!(seqs(&page1.records), vec![1, 2]);
    assert!(page1.next.is_some());

    let page2 = query.page_async(2, page1.next.as_deref()).await.unwrap();
    assert_eq!(seqs(&page2.records), vec![3, 4]);
    assert!(page2.next.is_some());
    assert_ne!(page1.next, page2.next);

    let page3 = query.page_async(2, page2.next.as_deref()).await.unwrap();
    assert_eq!(seqs(&page3.records), vec![5]);
    assert!(page3.next.is_none());

    // paged statements go through the prepared cache
    assert!(engine.session().executed().iter().all(|s| s.prepared));
    assert_eq!(engine.session().executed().len(), 3);
}

#[tokio::test]
async fn test_paging_rejects_garbage_token() {
    let engine = seeded_engine(2).await;
    let err = engine
        .model::<Reading>()
        .unwrap()
        .all()
        .page_async(2, Some("%%not-a-token%%"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CASSMAP_STATEMENT_EXECUTION_FAILURE");
}

// =============================================================================
// Blocking Mode
// =============================================================================

#[test]
fn test_blocking_engine_round_trip() {
    let engine = BlockingEngine::new(MemorySession::new(), config()).unwrap();
    let readings = engine.model::<Reading>().unwrap();
    readings.sync_table(SyncMode::Apply).unwrap();

    for seq in 1..=3 {
        readings
            .create(json!({"sensor": "s2", "seq": seq, "value": 0.5}))
            .unwrap();
    }

    let query = readings.filter(Predicate::eq("sensor", json!("s2"))).unwrap();
    assert_eq!(query.count().unwrap(), 3);

    let fetched = readings
        .get(json!({"sensor": "s2", "seq": 2}))
        .unwrap()
        .unwrap();
    assert_eq!(fetched.get("value"), Some(&json!(0.5)));
    assert_eq!(fetched.get("label"), Some(&Value::Null));

    let page = readings.all().page(2, None).unwrap();
    assert_eq!(page.records.len(), 2);
    assert!(page.next.is_some());
}
