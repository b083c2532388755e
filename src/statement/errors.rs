//! Statement builder errors
//!
//! Error codes:
//! - CASSMAP_UNKNOWN_FIELD
//! - CASSMAP_UNSUPPORTED_OPERATOR
//! - CASSMAP_EMPTY_MEMBERSHIP
//! - CASSMAP_INVALID_OPERATOR
//! - CASSMAP_MISSING_KEY
//! - CASSMAP_KEY_NOT_UPDATABLE
//! - CASSMAP_EMPTY_UPDATE
//! - CASSMAP_UNRESTRICTED_DELETE
//! - CASSMAP_NOT_A_COLLECTION
//! - CASSMAP_EMPTY_DELTA
//! - CASSMAP_INVALID_LIMIT
//!
//! All of these are raised before anything reaches the wire.

use thiserror::Error;

use crate::schema::SchemaError;

/// Result type for statement construction
pub type StatementResult<T> = Result<T, StatementError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatementError {
    /// A bound value failed its field kind
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Predicate or assignment names an undeclared field
    #[error("table '{table}' has no field '{field}'")]
    UnknownField { table: String, field: String },

    /// Lookup suffix is not a known operator
    #[error("unsupported lookup operator '{operator}' in '{lookup}'")]
    UnsupportedOperator { lookup: String, operator: String },

    /// `In` with an empty or non-array value
    #[error("field '{field}': IN requires a non-empty list of values")]
    EmptyMembership { field: String },

    /// Operator does not apply to the field kind
    #[error("field '{field}': operator {operator} cannot be used here: {reason}")]
    InvalidOperator {
        field: String,
        operator: &'static str,
        reason: &'static str,
    },

    /// A write needs a primary key column that was not supplied
    #[error("missing value for key column '{field}'")]
    MissingKey { field: String },

    /// Primary key columns cannot be assigned
    #[error("key column '{field}' cannot be updated")]
    KeyNotUpdatable { field: String },

    /// Update without assignments
    #[error("update on table '{table}' has no changes")]
    EmptyUpdate { table: String },

    /// Delete without full partition restriction
    #[error("delete on table '{table}' must restrict {reason}")]
    UnrestrictedDelete { table: String, reason: String },

    /// Delta targets a non-collection field
    #[error("field '{field}' is not a collection")]
    NotACollection { field: String },

    /// Delta with nothing to add or remove
    #[error("collection update on '{field}' has no additions or removals")]
    EmptyDelta { field: String },

    /// Limit must be positive
    #[error("limit must be greater than zero")]
    InvalidLimit,
}

impl StatementError {
    pub fn code(&self) -> &'static str {
        match self {
            StatementError::Schema(e) => e.code(),
            StatementError::UnknownField { .. } => "CASSMAP_UNKNOWN_FIELD",
            StatementError::UnsupportedOperator { .. } => "CASSMAP_UNSUPPORTED_OPERATOR",
            StatementError::EmptyMembership { .. } => "CASSMAP_EMPTY_MEMBERSHIP",
            StatementError::InvalidOperator { .. } => "CASSMAP_INVALID_OPERATOR",
            StatementError::MissingKey { .. } => "CASSMAP_MISSING_KEY",
            StatementError::KeyNotUpdatable { .. } => "CASSMAP_KEY_NOT_UPDATABLE",
            StatementError::EmptyUpdate { .. } => "CASSMAP_EMPTY_UPDATE",
            StatementError::UnrestrictedDelete { .. } => "CASSMAP_UNRESTRICTED_DELETE",
            StatementError::NotACollection { .. } => "CASSMAP_NOT_A_COLLECTION",
            StatementError::EmptyDelta { .. } => "CASSMAP_EMPTY_DELTA",
            StatementError::InvalidLimit => "CASSMAP_INVALID_LIMIT",
        }
    }

    pub(crate) fn unknown_field(table: &str, field: &str) -> Self {
        StatementError::UnknownField {
            table: table.to_string(),
            field: field.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(StatementError::InvalidLimit.code(), "CASSMAP_INVALID_LIMIT");
        assert_eq!(
            StatementError::from(SchemaError::type_mismatch("age", "int", "text")).code(),
            "CASSMAP_TYPE_MISMATCH"
        );
    }
}
