//! Schema synchronization errors
//!
//! Error codes:
//! - CASSMAP_KEYSPACE_REQUIRED
//! - CASSMAP_CATALOG_UNAVAILABLE
//! - CASSMAP_INCOMPATIBLE_PRIMARY_KEY
//! - CASSMAP_DDL_EXECUTION_FAILURE
//!
//! DDL is never rolled back. A failure reports what was already applied.

use thiserror::Error;

use crate::schema::SchemaError;
use crate::session::ExecutionError;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Catalog lookup needs a keyspace and none is configured
    #[error("a keyspace is required to synchronize table '{table}'")]
    KeyspaceRequired { table: String },

    /// The catalog could not be read or returned unexpected rows
    #[error("catalog unavailable for table '{table}': {reason}")]
    CatalogUnavailable { table: String, reason: String },

    /// Declared key tuple differs from the live table
    #[error(
        "table '{table}' has an incompatible primary key: declared {declared}, remote {remote}"
    )]
    IncompatiblePrimaryKey {
        table: String,
        declared: String,
        remote: String,
    },

    /// A DDL statement failed; earlier statements stay applied
    #[error("DDL failed: {statement} ({} statement(s) already applied): {source}", applied.len())]
    DdlExecutionFailure {
        statement: String,
        applied: Vec<String>,
        #[source]
        source: ExecutionError,
    },
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Schema(e) => e.code(),
            SyncError::KeyspaceRequired { .. } => "CASSMAP_KEYSPACE_REQUIRED",
            SyncError::CatalogUnavailable { .. } => "CASSMAP_CATALOG_UNAVAILABLE",
            SyncError::IncompatiblePrimaryKey { .. } => "CASSMAP_INCOMPATIBLE_PRIMARY_KEY",
            SyncError::DdlExecutionFailure { .. } => "CASSMAP_DDL_EXECUTION_FAILURE",
        }
    }

    /// Statements applied before the failure, if any
    pub fn applied(&self) -> &[String] {
        match self {
            SyncError::DdlExecutionFailure { applied, .. } => applied,
            _ => &[],
        }
    }
}
