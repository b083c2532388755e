//! Bulk Insert Tests
//!
//! Unlogged batch chunking and partial failure reporting.

use cassmap::engine::BatchReport;
use cassmap::schema::{CqlValue, Entity, FieldDef};
use cassmap::session::ExecutionError;
use cassmap::sync::SyncMode;
use cassmap::{BlockingEngine, Engine, EngineConfig, MemorySession, QueryError};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

struct Event;

impl Entity for Event {
    const TABLE: &'static str = "events";

    fn fields() -> Vec<(&'static str, FieldDef)> {
        vec![
            ("id", FieldDef::int().partition_key()),
            ("body", FieldDef::text().required()),
        ]
    }
}

fn config() -> EngineConfig {
    EngineConfig::default()
        .with_keyspace("log")
        .with_max_batch_rows(2)
}

fn items(count: i64) -> Vec<Value> {
    (0..count)
        .map(|id| json!({"id": id, "body": format!("event {id}")}))
        .collect()
}

// =============================================================================
// Successful Runs
// =============================================================================

#[tokio::test]
async fn test_bulk_create_writes_every_row() {
    let engine = Engine::new(MemorySession::new(), config());
    let events = engine.model::<Event>().unwrap();
    events.sync_table_async(SyncMode::Apply).await.unwrap();

    let report = events.bulk_create_async(items(5)).await.unwrap();
    assert_eq!(
        report,
        BatchReport {
            succeeded: 3,
            failed: 0,
            rows_written: 5,
        }
    );
    assert_eq!(engine.session().count_executed("BEGIN UNLOGGED BATCH"), 3);
    assert_eq!(engine.session().rows("events").len(), 5);
    assert_eq!(engine.metrics().snapshot().batches_applied, 3);
}

#[tokio::test]
async fn test_invalid_item_stops_before_any_write() {
    let engine = Engine::new(MemorySession::new(), config());
    let events = engine.model::<Event>().unwrap();

    let mut batch = items(3);
    batch.push(json!({"id": 9}));
    let err = events.bulk_create_async(batch).await.unwrap_err();

    assert_eq!(err.code(), "CASSMAP_MISSING_REQUIRED");
    assert!(engine.session().executed().is_empty());
}

#[tokio::test]
async fn test_empty_input_is_a_no_op() {
    let engine = Engine::new(MemorySession::new(), config());
    let report = engine
        .model::<Event>()
        .unwrap()
        .bulk_create_async(Vec::new())
        .await
        .unwrap();
    assert_eq!(report, BatchReport::default());
}

// =============================================================================
// Partial Failure
// =============================================================================

#[tokio::test]
async fn test_failed_chunk_does_not_stop_the_rest() {
    let engine = Engine::new(MemorySession::new(), config());
    let events = engine.model::<Event>().unwrap();
    events.sync_table_async(SyncMode::Apply).await.unwrap();
    engine
        .session()
        .fail_on_value(CqlValue::Int(2), ExecutionError::unavailable("replica down"));

    let err = events.bulk_create_async(items(5)).await.unwrap_err();
    match err {
        QueryError::PartialBatchFailure {
            succeeded,
            failed,
            rows_written,
            causes,
        } => {
            assert_eq!((succeeded, failed, rows_written), (2, 1, 3));
            assert_eq!(causes.len(), 1);
            assert_eq!(causes[0].chunk, 1);
            assert_eq!(causes[0].rows, 2);
            assert_eq!(causes[0].source, ExecutionError::unavailable("replica down"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let mut ids: Vec<i32> = engine
        .session()
        .rows("events")
        .iter()
        .filter_map(|row| match row.get("id") {
            Some(CqlValue::Int(id)) => Some(*id),
            _ => None,
        })
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 4]);
    assert_eq!(engine.metrics().snapshot().batches_failed, 1);
}

#[tokio::test]
async fn test_reported_causes_are_capped() {
    let config = config().with_max_reported_failures(2);
    let engine = Engine::new(MemorySession::new(), config);
    let events = engine.model::<Event>().unwrap();
    engine
        .session()
        .fail_on("BEGIN UNLOGGED BATCH", ExecutionError::invalid("too large"));

    let err = events.bulk_create_async(items(8)).await.unwrap_err();
    match err {
        QueryError::PartialBatchFailure { failed, causes, .. } => {
            assert_eq!(failed, 4);
            let chunks: Vec<usize> = causes.iter().map(|c| c.chunk).collect();
            assert_eq!(chunks, vec![0, 1]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// =============================================================================
// Blocking Mode
// =============================================================================

#[test]
fn test_blocking_bulk_create_runs_sequentially() {
    let engine = BlockingEngine::new(MemorySession::new(), config()).unwrap();
    let events = engine.model::<Event>().unwrap();
    events.sync_table(SyncMode::Apply).unwrap();
    engine
        .session()
        .fail_on_value(CqlValue::Int(0), ExecutionError::invalid("rejected"));

    let err = events.bulk_create(items(4)).unwrap_err();
    assert_eq!(err.code(), "CASSMAP_PARTIAL_BATCH_FAILURE");

    let batches: Vec<String> = engine
        .session()
        .executed_cql()
        .into_iter()
        .filter(|cql| cql.starts_with("BEGIN UNLOGGED BATCH"))
        .collect();
    assert_eq!(batches.len(), 2);
    assert_eq!(engine.session().rows("events").len(), 2);
}
