//! Schema error types
//!
//! Error codes:
//! - CASSMAP_TYPE_MISMATCH
//! - CASSMAP_UNSUPPORTED_NESTING
//! - CASSMAP_NO_PARTITION_KEY
//! - CASSMAP_DUPLICATE_FIELD
//! - CASSMAP_COLLECTION_KEY
//! - CASSMAP_CONFLICTING_DEFAULT
//! - CASSMAP_INVALID_IDENTIFIER
//! - CASSMAP_UNKNOWN_FIELD
//! - CASSMAP_MISSING_REQUIRED
//!
//! Declaration errors surface when a shape is derived. Value errors surface
//! when a record is built or a value is encoded/decoded.

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema declaration and value errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Value cannot be coerced to the declared kind
    #[error("field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// A collection declared as the element of another collection
    #[error("field '{field}': {outer} cannot contain a nested collection")]
    UnsupportedNesting { field: String, outer: &'static str },

    /// Shape declares no partition key
    #[error("table '{table}' declares no partition key")]
    NoPartitionKey { table: String },

    /// Two fields share a name
    #[error("table '{table}' declares field '{field}' more than once")]
    DuplicateField { table: String, field: String },

    /// Collection kinds cannot participate in the primary key
    #[error("field '{field}': collection columns cannot be part of the primary key")]
    CollectionKey { field: String },

    /// A field is both required and defaulted
    #[error("field '{field}' cannot be required and have a default at the same time")]
    ConflictingDefault { field: String },

    /// Table or column name is not a valid CQL identifier
    #[error("'{name}' is not a valid identifier")]
    InvalidIdentifier { name: String },

    /// Value supplied for a field the shape does not declare
    #[error("table '{table}' has no field '{field}'")]
    UnknownField { table: String, field: String },

    /// Required field missing from a record
    #[error("field '{field}' is required")]
    MissingRequired { field: String },
}

impl SchemaError {
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Re-labels a type mismatch with the owning field's path.
    ///
    /// Codecs report element failures with an empty or positional field
    /// name; callers that know the column prefix it here.
    pub fn at_field(self, field: &str) -> Self {
        match self {
            SchemaError::TypeMismatch {
                field: inner,
                expected,
                actual,
            } => SchemaError::TypeMismatch {
                field: if inner.is_empty() {
                    field.to_string()
                } else {
                    format!("{}{}", field, inner)
                },
                expected,
                actual,
            },
            other => other,
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::TypeMismatch { .. } => "CASSMAP_TYPE_MISMATCH",
            SchemaError::UnsupportedNesting { .. } => "CASSMAP_UNSUPPORTED_NESTING",
            SchemaError::NoPartitionKey { .. } => "CASSMAP_NO_PARTITION_KEY",
            SchemaError::DuplicateField { .. } => "CASSMAP_DUPLICATE_FIELD",
            SchemaError::CollectionKey { .. } => "CASSMAP_COLLECTION_KEY",
            SchemaError::ConflictingDefault { .. } => "CASSMAP_CONFLICTING_DEFAULT",
            SchemaError::InvalidIdentifier { .. } => "CASSMAP_INVALID_IDENTIFIER",
            SchemaError::UnknownField { .. } => "CASSMAP_UNKNOWN_FIELD",
            SchemaError::MissingRequired { .. } => "CASSMAP_MISSING_REQUIRED",
        }
    }

    /// Returns true for errors raised while deriving a shape
    pub fn is_declaration_error(&self) -> bool {
        matches!(
            self,
            SchemaError::UnsupportedNesting { .. }
                | SchemaError::NoPartitionKey { .. }
                | SchemaError::DuplicateField { .. }
                | SchemaError::CollectionKey { .. }
                | SchemaError::ConflictingDefault { .. }
                | SchemaError::InvalidIdentifier { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SchemaError::type_mismatch("age", "int", "text").code(),
            "CASSMAP_TYPE_MISMATCH"
        );
        assert_eq!(
            SchemaError::NoPartitionKey { table: "t".into() }.code(),
            "CASSMAP_NO_PARTITION_KEY"
        );
    }

    #[test]
    fn test_at_field_prefixes_element_path() {
        let err = SchemaError::type_mismatch("[2]", "int", "text").at_field("scores");
        assert_eq!(
            err,
            SchemaError::type_mismatch("scores[2]", "int", "text")
        );

        let err = SchemaError::type_mismatch("", "uuid", "text").at_field("id");
        assert!(err.to_string().contains("field 'id'"));
    }

    #[test]
    fn test_declaration_errors() {
        assert!(SchemaError::NoPartitionKey { table: "t".into() }.is_declaration_error());
        assert!(!SchemaError::MissingRequired { field: "name".into() }.is_declaration_error());
    }
}
