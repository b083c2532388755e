//! Observable events
//!
//! Event names attached to `tracing` records as the `event` field.

use std::fmt;

/// Observable events in the mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Statement dispatch
    /// Statement handed to the session
    StatementDispatched,
    /// Session reported a failure
    StatementFailed,
    /// Statement prepared and cached
    StatementPrepared,

    // Query shaping
    /// Filter on a column with no key or index
    UnindexedFilter,
    /// Ordering applied client-side
    OrderingNotPushable,

    // Schema synchronization
    /// Sync plan computed
    SyncPlanned,
    /// DDL statement applied
    DdlApplied,
    /// DDL statement failed, remaining plan aborted
    DdlFailed,
    /// Remote column absent from the model
    RemovableColumn,
    /// Shared column with a different remote type
    ColumnTypeMismatch,

    // Batching
    /// Batch chunk applied
    BatchApplied,
    /// Batch chunk failed
    BatchFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StatementDispatched => "STATEMENT_DISPATCHED",
            Event::StatementFailed => "STATEMENT_FAILED",
            Event::StatementPrepared => "STATEMENT_PREPARED",

            Event::UnindexedFilter => "UNINDEXED_FILTER",
            Event::OrderingNotPushable => "ORDERING_NOT_PUSHABLE",

            Event::SyncPlanned => "SYNC_PLANNED",
            Event::DdlApplied => "DDL_APPLIED",
            Event::DdlFailed => "DDL_FAILED",
            Event::RemovableColumn => "REMOVABLE_COLUMN",
            Event::ColumnTypeMismatch => "COLUMN_TYPE_MISMATCH",

            Event::BatchApplied => "BATCH_APPLIED",
            Event::BatchFailed => "BATCH_FAILED",
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::StatementFailed | Event::DdlFailed | Event::BatchFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::DdlApplied.as_str(), "DDL_APPLIED");
        assert_eq!(Event::UnindexedFilter.to_string(), "UNINDEXED_FILTER");
        assert!(Event::BatchFailed.is_failure());
        assert!(!Event::BatchApplied.is_failure());
    }
}
