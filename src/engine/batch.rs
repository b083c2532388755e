//! Bulk inserts as unlogged batches
//!
//! Records are encoded up front, split into chunks bounded by row count and
//! estimated size, and each chunk is sent as one `BEGIN UNLOGGED BATCH`.
//! A failed chunk does not stop the others.

use futures_util::stream::{self, StreamExt};
use tracing::{debug, error};

use crate::config::EngineConfig;
use crate::observability::Event;
use crate::schema::{Record, SchemaModel};
use crate::session::AsyncSession;
use crate::statement::{build_batch, build_insert, Statement};

use super::engine::Engine;
use super::errors::{BatchFailure, QueryError, QueryResult};

/// Outcome of a bulk insert where every chunk applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub rows_written: usize,
}

/// One unlogged batch ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct BatchChunk {
    pub index: usize,
    pub rows: usize,
    pub statement: Statement,
}

/// Splits records into batch chunks.
///
/// A chunk closes at `max_batch_rows`, or before a row that would push it
/// past `max_batch_bytes`. A single row is always accepted, whatever its
/// size. Fails before producing anything if a record does not encode.
pub fn plan_chunks(
    schema: &SchemaModel,
    records: &[Record],
    config: &EngineConfig,
) -> QueryResult<Vec<BatchChunk>> {
    let inserts = records
        .iter()
        .map(|record| build_insert(schema, record))
        .collect::<Result<Vec<_>, _>>()?;

    let mut chunks = Vec::new();
    let mut pending: Vec<Statement> = Vec::new();
    let mut pending_bytes = 0usize;

    let mut close = |pending: &mut Vec<Statement>, pending_bytes: &mut usize| {
        if pending.is_empty() {
            return;
        }
        chunks.push(BatchChunk {
            index: chunks.len(),
            rows: pending.len(),
            statement: build_batch(pending.as_slice()),
        });
        pending.clear();
        *pending_bytes = 0;
    };

    for insert in inserts {
        let size = insert.estimated_size();
        let full = pending.len() >= config.max_batch_rows
            || pending_bytes + size > config.max_batch_bytes;
        if !pending.is_empty() && full {
            close(&mut pending, &mut pending_bytes);
        }
        pending_bytes += size;
        pending.push(insert);
    }
    close(&mut pending, &mut pending_bytes);

    Ok(chunks)
}

/// Runs chunks with at most `concurrency` in flight.
pub(crate) async fn run_chunks<S: AsyncSession>(
    engine: &Engine<S>,
    table: &str,
    chunks: Vec<BatchChunk>,
    concurrency: usize,
) -> QueryResult<BatchReport> {
    let outcomes: Vec<(BatchChunk, Result<(), BatchFailure>)> = stream::iter(chunks)
        .map(|chunk| async move {
            let outcome = engine
                .dispatch(&chunk.statement)
                .await
                .map(|_| ())
                .map_err(|source| BatchFailure {
                    chunk: chunk.index,
                    rows: chunk.rows,
                    source,
                });
            (chunk, outcome)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = BatchReport::default();
    let mut causes = Vec::new();
    for (chunk, outcome) in outcomes {
        match outcome {
            Ok(()) => {
                report.succeeded += 1;
                report.rows_written += chunk.rows;
                engine.metrics().increment_batches_applied();
                debug!(
                    event = Event::BatchApplied.as_str(),
                    table = %table,
                    chunk = chunk.index,
                    rows = chunk.rows,
                );
            }
            Err(failure) => {
                report.failed += 1;
                engine.metrics().increment_batches_failed();
                error!(
                    event = Event::BatchFailed.as_str(),
                    table = %table,
                    chunk = failure.chunk,
                    rows = failure.rows,
                    error = %failure.source,
                );
                causes.push(failure);
            }
        }
    }

    if causes.is_empty() {
        return Ok(report);
    }

    causes.sort_by_key(|c| c.chunk);
    causes.truncate(engine.config().max_reported_failures);
    Err(QueryError::PartialBatchFailure {
        succeeded: report.succeeded,
        failed: report.failed,
        rows_written: report.rows_written,
        causes,
    })
}

/// Inserts records, chunks running concurrently up to
/// `max_concurrent_batches`.
pub async fn bulk_insert_async<S: AsyncSession>(
    engine: &Engine<S>,
    schema: &SchemaModel,
    records: &[Record],
) -> QueryResult<BatchReport> {
    let chunks = plan_chunks(schema, records, engine.config())?;
    let concurrency = engine.config().max_concurrent_batches;
    run_chunks(engine, schema.table(), chunks, concurrency).await
}

/// Inserts records, one chunk at a time.
pub fn bulk_insert<S: AsyncSession>(
    engine: &Engine<S>,
    schema: &SchemaModel,
    records: &[Record],
) -> QueryResult<BatchReport> {
    let chunks = plan_chunks(schema, records, engine.config())?;
    engine.block_on(run_chunks(engine, schema.table(), chunks, 1))?
}
