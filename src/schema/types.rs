//! Field type descriptors
//!
//! Supported kinds:
//! - text, int (32-bit), bigint, float (32-bit), double, boolean
//! - timestamp, uuid
//! - decimal with bounded precision/scale, blob with bounded size
//! - list, set, map (elements must be scalar kinds)

use serde_json::Value;
use std::fmt;

/// Logical column kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Int,
    BigInt,
    Float,
    Double,
    Boolean,
    Timestamp,
    Uuid,
    /// Decimal limited to `precision` total digits, `scale` of them fractional
    Decimal { precision: u32, scale: u32 },
    /// Binary value limited to `max_len` bytes when set
    Blob { max_len: Option<usize> },
    List(Box<FieldKind>),
    Set(Box<FieldKind>),
    Map(Box<FieldKind>, Box<FieldKind>),
}

impl FieldKind {
    /// Returns the kind name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Int => "int",
            FieldKind::BigInt => "bigint",
            FieldKind::Float => "float",
            FieldKind::Double => "double",
            FieldKind::Boolean => "boolean",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Uuid => "uuid",
            FieldKind::Decimal { .. } => "decimal",
            FieldKind::Blob { .. } => "blob",
            FieldKind::List(_) => "list",
            FieldKind::Set(_) => "set",
            FieldKind::Map(_, _) => "map",
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            FieldKind::List(_) | FieldKind::Set(_) | FieldKind::Map(_, _)
        )
    }

    /// Returns the CQL type used in DDL, e.g. `map<text, int>`
    pub fn cql_type(&self) -> String {
        match self {
            FieldKind::List(elem) => format!("list<{}>", elem.cql_type()),
            FieldKind::Set(elem) => format!("set<{}>", elem.cql_type()),
            FieldKind::Map(key, value) => {
                format!("map<{}, {}>", key.cql_type(), value.cql_type())
            }
            scalar => scalar.type_name().to_string(),
        }
    }

    /// Element kind for list/set, value kind for map
    pub fn element_kind(&self) -> Option<&FieldKind> {
        match self {
            FieldKind::List(elem) | FieldKind::Set(elem) => Some(elem),
            FieldKind::Map(_, value) => Some(value),
            _ => None,
        }
    }

    /// Key kind for map
    pub fn key_kind(&self) -> Option<&FieldKind> {
        match self {
            FieldKind::Map(key, _) => Some(key),
            _ => None,
        }
    }

    /// Returns the outer collection name if a collection is nested inside this kind
    pub(crate) fn nested_collection(&self) -> Option<&'static str> {
        match self {
            FieldKind::List(elem) | FieldKind::Set(elem) if elem.is_collection() => {
                Some(self.type_name())
            }
            FieldKind::Map(key, value) if key.is_collection() || value.is_collection() => {
                Some(self.type_name())
            }
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cql_type())
    }
}

/// On-disk order of a clustering column within its partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusteringOrder {
    Asc,
    Desc,
}

impl ClusteringOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusteringOrder::Asc => "ASC",
            ClusteringOrder::Desc => "DESC",
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            ClusteringOrder::Asc => ClusteringOrder::Desc,
            ClusteringOrder::Desc => ClusteringOrder::Asc,
        }
    }
}

/// Role of a field in the primary key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    None,
    Partition,
    Clustering(ClusteringOrder),
}

/// Default applied when a record omits a field
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Value(Value),
    Factory(fn() -> Value),
}

impl DefaultValue {
    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Factory(f) => f(),
        }
    }
}

fn new_uuid() -> Value {
    Value::String(uuid::Uuid::new_v4().to_string())
}

/// Field definition: kind plus declaration markers.
///
/// Built with chained constructors:
///
/// ```ignore
/// FieldDef::uuid().primary_key();
/// FieldDef::text().required().indexed();
/// FieldDef::timestamp().clustering_key(ClusteringOrder::Desc);
/// FieldDef::set(FieldKind::Text);
/// ```
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<DefaultValue>,
    pub indexed: bool,
    pub key: KeyRole,
}

impl FieldDef {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            indexed: false,
            key: KeyRole::None,
        }
    }

    pub fn text() -> Self {
        Self::new(FieldKind::Text)
    }

    pub fn int() -> Self {
        Self::new(FieldKind::Int)
    }

    pub fn bigint() -> Self {
        Self::new(FieldKind::BigInt)
    }

    pub fn float() -> Self {
        Self::new(FieldKind::Float)
    }

    pub fn double() -> Self {
        Self::new(FieldKind::Double)
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn timestamp() -> Self {
        Self::new(FieldKind::Timestamp)
    }

    pub fn uuid() -> Self {
        Self::new(FieldKind::Uuid)
    }

    pub fn decimal(precision: u32, scale: u32) -> Self {
        Self::new(FieldKind::Decimal { precision, scale })
    }

    pub fn blob(max_len: Option<usize>) -> Self {
        Self::new(FieldKind::Blob { max_len })
    }

    pub fn list(element: FieldKind) -> Self {
        Self::new(FieldKind::List(Box::new(element)))
    }

    pub fn set(element: FieldKind) -> Self {
        Self::new(FieldKind::Set(Box::new(element)))
    }

    pub fn map(key: FieldKind, value: FieldKind) -> Self {
        Self::new(FieldKind::Map(Box::new(key), Box::new(value)))
    }

    /// Marks the field as (part of) the partition key.
    pub fn partition_key(mut self) -> Self {
        self.key = KeyRole::Partition;
        self
    }

    /// Shorthand for a single-column primary key
    pub fn primary_key(self) -> Self {
        self.partition_key()
    }

    pub fn clustering_key(mut self, order: ClusteringOrder) -> Self {
        self.key = KeyRole::Clustering(order);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Value(value));
        self
    }

    pub fn default_with(mut self, factory: fn() -> Value) -> Self {
        self.default = Some(DefaultValue::Factory(factory));
        self
    }

    pub fn is_partition_key(&self) -> bool {
        self.key == KeyRole::Partition
    }

    pub fn is_clustering_key(&self) -> bool {
        matches!(self.key, KeyRole::Clustering(_))
    }

    pub fn is_key(&self) -> bool {
        self.key != KeyRole::None
    }

    /// Value generated for an absent field with no default.
    ///
    /// An optional uuid partition key gets a random v4 id.
    pub fn generated_value(&self) -> Option<Value> {
        let generates = self.kind == FieldKind::Uuid
            && self.is_partition_key()
            && self.default.is_none()
            && !self.required;
        generates.then(new_uuid)
    }

    pub fn clustering_order(&self) -> Option<ClusteringOrder> {
        match self.key {
            KeyRole::Clustering(order) => Some(order),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cql_types() {
        assert_eq!(FieldKind::Text.cql_type(), "text");
        assert_eq!(FieldKind::Decimal { precision: 10, scale: 2 }.cql_type(), "decimal");
        assert_eq!(FieldDef::list(FieldKind::Text).kind.cql_type(), "list<text>");
        assert_eq!(
            FieldDef::map(FieldKind::Text, FieldKind::Int).kind.cql_type(),
            "map<text, int>"
        );
    }

    #[test]
    fn test_key_roles_are_exclusive() {
        let field = FieldDef::int()
            .partition_key()
            .clustering_key(ClusteringOrder::Desc);
        assert!(!field.is_partition_key());
        assert_eq!(field.clustering_order(), Some(ClusteringOrder::Desc));
    }

    #[test]
    fn test_uuid_primary_key_generates_value() {
        let field = FieldDef::uuid().primary_key();
        assert!(field.default.is_none());
        let text = field
            .generated_value()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap();
        assert!(uuid::Uuid::parse_str(&text).is_ok());

        assert!(FieldDef::uuid().generated_value().is_none());
    }

    #[test]
    fn test_required_uuid_key_in_either_order() {
        let before = FieldDef::uuid().required().partition_key();
        let after = FieldDef::uuid().partition_key().required();
        assert_eq!(before.required, after.required);
        assert_eq!(before.key, after.key);
        assert!(before.default.is_none() && after.default.is_none());
        assert!(before.generated_value().is_none());
        assert!(after.generated_value().is_none());
    }

    #[test]
    fn test_nested_collection_detection() {
        let nested = FieldKind::List(Box::new(FieldKind::Set(Box::new(FieldKind::Text))));
        assert_eq!(nested.nested_collection(), Some("list"));
        assert_eq!(FieldKind::Set(Box::new(FieldKind::Int)).nested_collection(), None);
    }
}
