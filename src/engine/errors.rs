//! Query execution errors
//!
//! Error codes:
//! - CASSMAP_STATEMENT_EXECUTION_FAILURE
//! - CASSMAP_PARTIAL_BATCH_FAILURE
//! - CASSMAP_MULTIPLE_ROWS_RETURNED
//! - CASSMAP_UNEXPECTED_RESULT
//! - CASSMAP_RUNTIME
//!
//! Statement, schema and sync errors keep their own codes.
//!
//! All variants are `Clone`: a materialized query caches its error and
//! hands out copies on every later access.

use std::fmt;

use thiserror::Error;

use crate::schema::SchemaError;
use crate::session::ExecutionError;
use crate::statement::StatementError;
use crate::sync::SyncError;

/// Result type for query execution
pub type QueryResult<T> = Result<T, QueryError>;

/// One failed batch chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Chunk position in submission order
    pub chunk: usize,
    /// Rows carried by the chunk
    pub rows: usize,
    pub source: ExecutionError,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk {} ({} rows): {}", self.chunk, self.rows, self.source)
    }
}

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The session rejected or failed a statement
    #[error("statement failed: {statement}: {source}")]
    StatementExecutionFailure {
        statement: String,
        #[source]
        source: ExecutionError,
    },

    /// Some batch chunks failed; the others stay applied
    #[error("{failed} batch chunk(s) failed, {succeeded} applied ({rows_written} rows written)")]
    PartialBatchFailure {
        succeeded: usize,
        failed: usize,
        rows_written: usize,
        /// First failures in chunk order, capped by configuration
        causes: Vec<BatchFailure>,
    },

    /// A single-row lookup matched several rows
    #[error("expected at most one row from '{table}', found {count}")]
    MultipleRowsReturned { table: String, count: usize },

    /// The store answered with an unexpected shape
    #[error("unexpected result: {0}")]
    UnexpectedResult(String),

    /// Blocking execution is unavailable
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Statement(e) => e.code(),
            QueryError::Schema(e) => e.code(),
            QueryError::Sync(e) => e.code(),
            QueryError::StatementExecutionFailure { .. } => "CASSMAP_STATEMENT_EXECUTION_FAILURE",
            QueryError::PartialBatchFailure { .. } => "CASSMAP_PARTIAL_BATCH_FAILURE",
            QueryError::MultipleRowsReturned { .. } => "CASSMAP_MULTIPLE_ROWS_RETURNED",
            QueryError::UnexpectedResult(_) => "CASSMAP_UNEXPECTED_RESULT",
            QueryError::Runtime(_) => "CASSMAP_RUNTIME",
        }
    }

    /// Session error behind a failed statement, if that is what this is
    pub fn execution_error(&self) -> Option<&ExecutionError> {
        match self {
            QueryError::StatementExecutionFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let err = QueryError::StatementExecutionFailure {
            statement: "SELECT id FROM t".into(),
            source: ExecutionError::unavailable("no hosts"),
        };
        assert_eq!(err.code(), "CASSMAP_STATEMENT_EXECUTION_FAILURE");
        assert_eq!(err.execution_error().map(|e| e.code()), Some("CASSMAP_UNAVAILABLE"));

        let err: QueryError = StatementError::InvalidLimit.into();
        assert_eq!(err.code(), StatementError::InvalidLimit.code());
    }

    #[test]
    fn test_partial_batch_message() {
        let err = QueryError::PartialBatchFailure {
            succeeded: 2,
            failed: 1,
            rows_written: 200,
            causes: vec![BatchFailure {
                chunk: 1,
                rows: 100,
                source: ExecutionError::invalid("too large"),
            }],
        };
        assert_eq!(
            err.to_string(),
            "1 batch chunk(s) failed, 2 applied (200 rows written)"
        );
    }
}
