//! Wire-level values bound to statements and returned in rows

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A value as it travels to and from the store.
///
/// Collections keep their elements in wire order. Sets are already
/// de-duplicated by the encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    Null,
    Text(String),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Decimal(Decimal),
    Blob(Vec<u8>),
    List(Vec<CqlValue>),
    Set(Vec<CqlValue>),
    Map(Vec<(CqlValue, CqlValue)>),
}

impl CqlValue {
    /// Returns the value kind name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            CqlValue::Null => "null",
            CqlValue::Text(_) => "text",
            CqlValue::Int(_) => "int",
            CqlValue::BigInt(_) => "bigint",
            CqlValue::Float(_) => "float",
            CqlValue::Double(_) => "double",
            CqlValue::Boolean(_) => "boolean",
            CqlValue::Timestamp(_) => "timestamp",
            CqlValue::Uuid(_) => "uuid",
            CqlValue::Decimal(_) => "decimal",
            CqlValue::Blob(_) => "blob",
            CqlValue::List(_) => "list",
            CqlValue::Set(_) => "set",
            CqlValue::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CqlValue::Null)
    }

    /// Approximate serialized size in bytes, used to weigh batches.
    pub fn estimated_size(&self) -> usize {
        match self {
            CqlValue::Null => 0,
            CqlValue::Text(s) => s.len(),
            CqlValue::Int(_) | CqlValue::Float(_) => 4,
            CqlValue::BigInt(_) | CqlValue::Double(_) | CqlValue::Timestamp(_) => 8,
            CqlValue::Boolean(_) => 1,
            CqlValue::Uuid(_) => 16,
            // scale + up to 16 bytes of unscaled varint
            CqlValue::Decimal(_) => 20,
            CqlValue::Blob(b) => b.len(),
            CqlValue::List(items) | CqlValue::Set(items) => {
                4 + items.iter().map(|v| 4 + v.estimated_size()).sum::<usize>()
            }
            CqlValue::Map(entries) => {
                4 + entries
                    .iter()
                    .map(|(k, v)| 8 + k.estimated_size() + v.estimated_size())
                    .sum::<usize>()
            }
        }
    }

    /// Integer view used when reading counters such as `COUNT(*)`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CqlValue::Int(v) => Some(i64::from(*v)),
            CqlValue::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Orders two values of the same kind.
    ///
    /// `Int` and `BigInt` compare numerically. Null sorts before any value.
    /// Values of unrelated kinds and collections are unordered.
    pub fn compare(&self, other: &CqlValue) -> Option<Ordering> {
        use CqlValue::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Null, _) => Some(Ordering::Less),
            (_, Null) => Some(Ordering::Greater),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (Uuid(a), Uuid(b)) => Some(a.cmp(b)),
            (Decimal(a), Decimal(b)) => Some(a.cmp(b)),
            (Blob(a), Blob(b)) => Some(a.cmp(b)),
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
        }
    }
}

impl From<&str> for CqlValue {
    fn from(value: &str) -> Self {
        CqlValue::Text(value.to_string())
    }
}

impl From<String> for CqlValue {
    fn from(value: String) -> Self {
        CqlValue::Text(value)
    }
}

impl From<i32> for CqlValue {
    fn from(value: i32) -> Self {
        CqlValue::Int(value)
    }
}

impl From<i64> for CqlValue {
    fn from(value: i64) -> Self {
        CqlValue::BigInt(value)
    }
}

impl From<bool> for CqlValue {
    fn from(value: bool) -> Self {
        CqlValue::Boolean(value)
    }
}

impl From<Uuid> for CqlValue {
    fn from(value: Uuid) -> Self {
        CqlValue::Uuid(value)
    }
}
