//! Statement building blocks
//!
//! Predicates, orderings and the parameterized statements produced from them.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

use crate::schema::CqlValue;
use crate::session::PageRequest;

use super::errors::{StatementError, StatementResult};

/// Filter operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    /// field = value
    Eq,
    /// field > value
    Gt,
    /// field >= value
    Gte,
    /// field < value
    Lt,
    /// field <= value
    Lte,
    /// field IN (values...)
    In,
    /// collection field holds the value
    Contains,
    /// map field holds the key
    ContainsKey,
}

impl FilterOp {
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte
        )
    }

    /// Eq and In fully restrict a key column
    pub fn is_restricting(&self) -> bool {
        matches!(self, FilterOp::Eq | FilterOp::In)
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, FilterOp::Contains | FilterOp::ContainsKey)
    }

    pub fn cql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::In => "IN",
            FilterOp::Contains => "CONTAINS",
            FilterOp::ContainsKey => "CONTAINS KEY",
        }
    }

    /// Lookup suffix, as in `age__gte`
    pub fn lookup_name(&self) -> &'static str {
        match self {
            FilterOp::Eq => "exact",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
            FilterOp::Contains => "contains",
            FilterOp::ContainsKey => "contains_key",
        }
    }

    pub fn from_lookup_name(name: &str) -> Option<Self> {
        match name {
            "exact" => Some(FilterOp::Eq),
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            "in" => Some(FilterOp::In),
            "contains" => Some(FilterOp::Contains),
            "contains_key" => Some(FilterOp::ContainsKey),
            _ => None,
        }
    }
}

/// A single predicate (field + operation + logical value)
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Lte, value)
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOp::In, Value::Array(values))
    }

    pub fn contains(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Contains, value)
    }

    pub fn contains_key(field: impl Into<String>, key: Value) -> Self {
        Self::new(field, FilterOp::ContainsKey, key)
    }

    /// Parses a lookup such as `age__gte`. A bare field name means equality.
    pub fn from_lookup(lookup: &str, value: Value) -> StatementResult<Self> {
        match lookup.rsplit_once("__") {
            None => Ok(Self::eq(lookup, value)),
            Some((field, suffix)) => match FilterOp::from_lookup_name(suffix) {
                Some(op) => Ok(Self::new(field, op, value)),
                None => Err(StatementError::UnsupportedOperator {
                    lookup: lookup.to_string(),
                    operator: suffix.to_string(),
                }),
            },
        }
    }
}

/// Predicates keyed by `(field, op)`.
///
/// Re-adding a key replaces its value and keeps its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateSet {
    entries: IndexMap<(String, FilterOp), Predicate>,
}

impl PredicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, predicate: Predicate) {
        self.entries
            .insert((predicate.field.clone(), predicate.op), predicate);
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.insert(predicate);
        self
    }

    /// Predicates in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.entries.values()
    }

    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Predicate> + 'a {
        self.entries.values().filter(move |p| p.field == field)
    }

    /// True if the field carries an Eq or In predicate
    pub fn restricts(&self, field: &str) -> bool {
        self.for_field(field).any(|p| p.op.is_restricting())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Predicate> for PredicateSet {
    fn from_iter<I: IntoIterator<Item = Predicate>>(iter: I) -> Self {
        let mut set = PredicateSet::new();
        for p in iter {
            set.insert(p);
        }
        set
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Sort specification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// `"-field"` sorts descending, `"field"` ascending
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(spec),
        }
    }
}

/// A parameterized statement ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cql: String,
    pub values: Vec<CqlValue>,
    pub paging: Option<PageRequest>,
}

impl Statement {
    pub fn new(cql: impl Into<String>, values: Vec<CqlValue>) -> Self {
        Self {
            cql: cql.into(),
            values,
            paging: None,
        }
    }

    pub fn with_paging(mut self, paging: PageRequest) -> Self {
        self.paging = Some(paging);
        self
    }

    /// Approximate payload size used to weigh batches
    pub fn estimated_size(&self) -> usize {
        self.cql.len() + self.values.iter().map(CqlValue::estimated_size).sum::<usize>()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cql)
    }
}

/// Non-fatal findings produced while building a select
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildWarning {
    /// Filter on a column that is neither a key nor indexed
    UnindexedFilter { field: String },
    /// Requested ordering cannot be executed by the store
    OrderingNotPushable { field: String, reason: &'static str },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::UnindexedFilter { field } => {
                write!(f, "filter on '{}' is not backed by a key or index", field)
            }
            BuildWarning::OrderingNotPushable { field, reason } => {
                write!(f, "ordering by '{}' sorted client-side: {}", field, reason)
            }
        }
    }
}

/// Output of `build_select`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub statement: Statement,
    pub warnings: Vec<BuildWarning>,
    /// True when an ordering was requested and emitted as `ORDER BY`
    pub ordering_pushed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_parsing() {
        let p = Predicate::from_lookup("age__gte", json!(18)).unwrap();
        assert_eq!(p, Predicate::gte("age", json!(18)));

        let p = Predicate::from_lookup("name", json!("bob")).unwrap();
        assert_eq!(p.op, FilterOp::Eq);

        let p = Predicate::from_lookup("attrs__contains_key", json!("color")).unwrap();
        assert_eq!(p.op, FilterOp::ContainsKey);

        let err = Predicate::from_lookup("name__like", json!("b%")).unwrap_err();
        assert_eq!(err.code(), "CASSMAP_UNSUPPORTED_OPERATOR");
    }

    #[test]
    fn test_predicate_set_last_write_wins_in_place() {
        let set = PredicateSet::new()
            .with(Predicate::eq("a", json!(1)))
            .with(Predicate::eq("b", json!(2)))
            .with(Predicate::eq("a", json!(3)));

        let fields: Vec<_> = set.iter().map(|p| (p.field.as_str(), p.value.clone())).collect();
        assert_eq!(fields, vec![("a", json!(3)), ("b", json!(2))]);
    }

    #[test]
    fn test_distinct_ops_coexist() {
        let set = PredicateSet::new()
            .with(Predicate::gte("age", json!(18)))
            .with(Predicate::lt("age", json!(65)));
        assert_eq!(set.len(), 2);
        assert!(!set.restricts("age"));
    }

    #[test]
    fn test_sort_spec_parse() {
        assert_eq!(SortSpec::parse("-created"), SortSpec::desc("created"));
        assert_eq!(SortSpec::parse("name"), SortSpec::asc("name"));
    }
}
