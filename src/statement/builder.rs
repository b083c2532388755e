//! Statement builder
//!
//! Pure translation of predicates, orderings and records into
//! parameterized CQL. Every value is a bound `?` parameter.
//!
//! WHERE emission order (strict):
//! 1. Partition key predicates, in key order
//! 2. Clustering key predicates, in key order
//! 3. Remaining predicates, in insertion order
//!
//! `ALLOW FILTERING` is appended when any of these hold:
//! - a non-key column without an index is filtered
//! - a partition key or indexed column carries a range
//! - a key column is filtered while the partition key is not fully
//!   restricted by Eq/In

use indexmap::IndexMap;
use serde_json::Value;

use crate::schema::{CqlValue, FieldDef, FieldKind, Record, SchemaModel};
use crate::session::PageRequest;

use super::ast::{
    BuildWarning, FilterOp, Predicate, PredicateSet, SelectStatement, SortSpec, Statement,
};
use super::errors::{StatementError, StatementResult};

/// Encoded WHERE clause
#[derive(Debug, Default)]
struct WhereClause {
    fragments: Vec<String>,
    values: Vec<CqlValue>,
    warnings: Vec<BuildWarning>,
    allow_filtering: bool,
}

impl WhereClause {
    fn render(&self) -> String {
        if self.fragments.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.fragments.join(" AND "))
        }
    }
}

/// Validates a predicate against the schema and encodes its bound value(s).
pub fn bind_predicate(schema: &SchemaModel, predicate: &Predicate) -> StatementResult<Vec<CqlValue>> {
    let field = predicate.field.as_str();
    let def = schema
        .field(field)
        .ok_or_else(|| StatementError::unknown_field(schema.table(), field))?;
    let invalid = |reason: &'static str| StatementError::InvalidOperator {
        field: field.to_string(),
        operator: predicate.op.cql(),
        reason,
    };

    let encoded = match predicate.op {
        FilterOp::In => {
            if def.kind.is_collection() {
                return Err(invalid("collections support only CONTAINS and CONTAINS KEY"));
            }
            let items = match &predicate.value {
                Value::Array(items) if !items.is_empty() => items,
                _ => {
                    return Err(StatementError::EmptyMembership {
                        field: field.to_string(),
                    })
                }
            };
            let mut encoded = Vec::with_capacity(items.len());
            for item in items {
                match encode_comparable(&def.kind, field, item) {
                    Some(result) => encoded.push(result?),
                    None => return Err(invalid("null cannot be compared")),
                }
            }
            encoded
        }
        FilterOp::Contains => match &def.kind {
            FieldKind::List(elem) | FieldKind::Set(elem) => {
                vec![elem.encode(&predicate.value).map_err(|e| e.at_field(field))?]
            }
            FieldKind::Map(_, value) => {
                vec![value.encode(&predicate.value).map_err(|e| e.at_field(field))?]
            }
            _ => return Err(invalid("CONTAINS applies to collection columns")),
        },
        FilterOp::ContainsKey => match &def.kind {
            FieldKind::Map(key, _) => {
                vec![key.encode(&predicate.value).map_err(|e| e.at_field(field))?]
            }
            _ => return Err(invalid("CONTAINS KEY applies to map columns")),
        },
        FilterOp::Eq | FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            if def.kind.is_collection() {
                return Err(invalid("collections support only CONTAINS and CONTAINS KEY"));
            }
            match encode_comparable(&def.kind, field, &predicate.value) {
                Some(result) => vec![result?],
                None => return Err(invalid("null cannot be compared")),
            }
        }
    };

    Ok(encoded)
}

/// Encodes a scalar comparison operand; `None` for null.
fn encode_comparable(
    kind: &FieldKind,
    field: &str,
    value: &Value,
) -> Option<StatementResult<CqlValue>> {
    if value.is_null() {
        return None;
    }
    Some(kind.encode(value).map_err(|e| e.at_field(field).into()))
}

/// Orders predicates: partition keys, clustering keys, then the rest.
fn ordered_predicates<'p>(
    schema: &'p SchemaModel,
    predicates: &'p PredicateSet,
) -> Vec<&'p Predicate> {
    let mut ordered = Vec::with_capacity(predicates.len());
    for pk in schema.partition_keys() {
        ordered.extend(predicates.for_field(pk));
    }
    for (ck, _) in schema.clustering_keys() {
        ordered.extend(predicates.for_field(ck));
    }
    ordered.extend(predicates.iter().filter(|p| !schema.is_key(&p.field)));
    ordered
}

fn partition_fully_restricted(schema: &SchemaModel, predicates: &PredicateSet) -> bool {
    schema
        .partition_keys()
        .iter()
        .all(|pk| predicates.restricts(pk))
}

fn fragment(predicate: &Predicate, bound: usize) -> String {
    match predicate.op {
        FilterOp::In => {
            let marks = vec!["?"; bound].join(", ");
            format!("{} IN ({})", predicate.field, marks)
        }
        op => format!("{} {} ?", predicate.field, op.cql()),
    }
}

fn build_where(schema: &SchemaModel, predicates: &PredicateSet) -> StatementResult<WhereClause> {
    let mut clause = WhereClause::default();
    let partition_restricted = partition_fully_restricted(schema, predicates);

    for predicate in ordered_predicates(schema, predicates) {
        let values = bind_predicate(schema, predicate)?;
        let field = predicate.field.as_str();

        if schema.is_partition_key(field) {
            if predicates.for_field(field).count() > 1 && predicates.restricts(field) {
                return Err(StatementError::InvalidOperator {
                    field: field.to_string(),
                    operator: predicate.op.cql(),
                    reason: "a partition key restricted by = or IN takes no other operator",
                });
            }
            if predicate.op.is_range() || !partition_restricted {
                clause.allow_filtering = true;
            }
        } else if schema.is_clustering_key(field) {
            if !partition_restricted {
                clause.allow_filtering = true;
            }
        } else if schema.is_indexed(field) {
            if predicate.op.is_range() {
                clause.allow_filtering = true;
            }
        } else {
            clause.allow_filtering = true;
            let warning = BuildWarning::UnindexedFilter {
                field: field.to_string(),
            };
            if !clause.warnings.contains(&warning) {
                clause.warnings.push(warning);
            }
        }

        clause.fragments.push(fragment(predicate, values.len()));
        clause.values.extend(values);
    }

    Ok(clause)
}

/// Decides whether an ordering can be emitted as `ORDER BY`.
fn ordering_pushability(
    schema: &SchemaModel,
    predicates: &PredicateSet,
    ordering: &SortSpec,
) -> StatementResult<Result<(), &'static str>> {
    if schema.field(&ordering.field).is_none() {
        return Err(StatementError::unknown_field(schema.table(), &ordering.field));
    }

    let leading = schema.clustering_keys().first().map(|(name, _)| name.as_str());
    if leading != Some(ordering.field.as_str()) {
        return Ok(Err(if schema.is_clustering_key(&ordering.field) {
            "only the leading clustering key can be ordered by the store"
        } else {
            "field is not a clustering key"
        }));
    }
    if !partition_fully_restricted(schema, predicates) {
        return Ok(Err("partition key is not fully restricted"));
    }
    // rows from several partitions cannot be ordered and paged by the store
    let multi_partition = schema
        .partition_keys()
        .iter()
        .any(|pk| predicates.for_field(pk).any(|p| p.op == FilterOp::In));
    if multi_partition {
        return Ok(Err("partition key is restricted by IN"));
    }
    // Either direction on the leading key is the declared order or its reverse.
    Ok(Ok(()))
}

fn limit_value(limit: u32) -> StatementResult<CqlValue> {
    if limit == 0 {
        return Err(StatementError::InvalidLimit);
    }
    i32::try_from(limit)
        .map(CqlValue::Int)
        .map_err(|_| StatementError::InvalidLimit)
}

fn column_list(schema: &SchemaModel) -> String {
    schema.column_names().collect::<Vec<_>>().join(", ")
}

/// Builds a select over every declared column.
pub fn build_select(
    schema: &SchemaModel,
    predicates: &PredicateSet,
    ordering: Option<&SortSpec>,
    limit: Option<u32>,
    paging: Option<&PageRequest>,
) -> StatementResult<SelectStatement> {
    let mut clause = build_where(schema, predicates)?;
    let mut cql = format!("SELECT {} FROM {}{}", column_list(schema), schema.table(), clause.render());

    let mut ordering_pushed = false;
    if let Some(order) = ordering {
        match ordering_pushability(schema, predicates, order)? {
            Ok(()) => {
                cql.push_str(&format!(" ORDER BY {} {}", order.field, order.direction.as_str()));
                ordering_pushed = true;
            }
            Err(reason) => clause.warnings.push(BuildWarning::OrderingNotPushable {
                field: order.field.clone(),
                reason,
            }),
        }
    }

    let mut values = clause.values;
    if let Some(limit) = limit {
        values.push(limit_value(limit)?);
        cql.push_str(" LIMIT ?");
    }
    if clause.allow_filtering {
        cql.push_str(" ALLOW FILTERING");
    }

    let mut statement = Statement::new(cql, values);
    statement.paging = paging.cloned();

    Ok(SelectStatement {
        statement,
        warnings: clause.warnings,
        ordering_pushed,
    })
}

/// `SELECT COUNT(*)` over the same restrictions as a select.
pub fn build_count(schema: &SchemaModel, predicates: &PredicateSet) -> StatementResult<Statement> {
    let clause = build_where(schema, predicates)?;
    let mut cql = format!("SELECT COUNT(*) FROM {}{}", schema.table(), clause.render());
    if clause.allow_filtering {
        cql.push_str(" ALLOW FILTERING");
    }
    Ok(Statement::new(cql, clause.values))
}

/// Selects only the partition key columns with `LIMIT 1`.
pub fn build_exists(schema: &SchemaModel, predicates: &PredicateSet) -> StatementResult<Statement> {
    let clause = build_where(schema, predicates)?;
    let mut cql = format!(
        "SELECT {} FROM {}{} LIMIT ?",
        schema.partition_keys().join(", "),
        schema.table(),
        clause.render()
    );
    if clause.allow_filtering {
        cql.push_str(" ALLOW FILTERING");
    }
    let mut values = clause.values;
    values.push(CqlValue::Int(1));
    Ok(Statement::new(cql, values))
}

/// Inserts every declared column of a record.
pub fn build_insert(schema: &SchemaModel, record: &Record) -> StatementResult<Statement> {
    let encoded = record.encode()?;
    let columns: Vec<&str> = encoded.iter().map(|(name, _)| name.as_str()).collect();
    let marks = vec!["?"; columns.len()].join(", ");
    let cql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.table(),
        columns.join(", "),
        marks
    );
    Ok(Statement::new(
        cql,
        encoded.into_iter().map(|(_, value)| value).collect(),
    ))
}

/// Renders `k1 = ? AND k2 = ?` for the full primary key.
fn key_clause(
    schema: &SchemaModel,
    key: &IndexMap<String, Value>,
) -> StatementResult<(Vec<String>, Vec<CqlValue>)> {
    if let Some(extra) = key.keys().find(|name| !schema.is_key(name)) {
        return Err(match schema.field(extra) {
            Some(_) => StatementError::InvalidOperator {
                field: extra.clone(),
                operator: "=",
                reason: "only primary key columns identify a row",
            },
            None => StatementError::unknown_field(schema.table(), extra),
        });
    }

    let mut fragments = Vec::new();
    let mut values = Vec::new();
    for column in schema.primary_key_columns() {
        let value = key
            .get(column)
            .filter(|v| !v.is_null())
            .ok_or_else(|| StatementError::MissingKey {
                field: column.to_string(),
            })?;
        let def = schema.require_field(column)?;
        values.push(def.kind.encode(value).map_err(|e| e.at_field(column))?);
        fragments.push(format!("{} = ?", column));
    }
    Ok((fragments, values))
}

fn settable<'s>(schema: &'s SchemaModel, field: &str) -> StatementResult<&'s FieldDef> {
    let def = schema
        .field(field)
        .ok_or_else(|| StatementError::unknown_field(schema.table(), field))?;
    if def.is_key() {
        return Err(StatementError::KeyNotUpdatable {
            field: field.to_string(),
        });
    }
    Ok(def)
}

/// Partial update addressed by the full primary key.
pub fn build_update(
    schema: &SchemaModel,
    key: &IndexMap<String, Value>,
    changes: &IndexMap<String, Value>,
) -> StatementResult<Statement> {
    if changes.is_empty() {
        return Err(StatementError::EmptyUpdate {
            table: schema.table().to_string(),
        });
    }

    let mut assignments = Vec::with_capacity(changes.len());
    let mut values = Vec::with_capacity(changes.len() + key.len());
    for (field, value) in changes {
        let def = settable(schema, field)?;
        if value.is_null() && def.required {
            return Err(crate::schema::SchemaError::MissingRequired {
                field: field.clone(),
            }
            .into());
        }
        values.push(def.kind.encode(value).map_err(|e| e.at_field(field))?);
        assignments.push(format!("{} = ?", field));
    }

    let (key_fragments, key_values) = key_clause(schema, key)?;
    values.extend(key_values);

    let cql = format!(
        "UPDATE {} SET {} WHERE {}",
        schema.table(),
        assignments.join(", "),
        key_fragments.join(" AND ")
    );
    Ok(Statement::new(cql, values))
}

/// Delete restricted to key columns.
///
/// Every partition key needs Eq/In. Clustering keys accept any comparison.
pub fn build_delete(schema: &SchemaModel, predicates: &PredicateSet) -> StatementResult<Statement> {
    let refuse = |reason: String| StatementError::UnrestrictedDelete {
        table: schema.table().to_string(),
        reason,
    };

    if predicates.is_empty() {
        return Err(refuse("the full partition key".to_string()));
    }
    for predicate in predicates.iter() {
        let field = predicate.field.as_str();
        if schema.field(field).is_none() {
            return Err(StatementError::unknown_field(schema.table(), field));
        }
        if !schema.is_key(field) {
            return Err(refuse(format!("key columns only, found '{}'", field)));
        }
        if predicate.op.is_membership() {
            return Err(refuse(format!(
                "key columns by comparison, found {} on '{}'",
                predicate.op.cql(),
                field
            )));
        }
        if schema.is_partition_key(field) && predicate.op.is_range() {
            return Err(refuse(format!(
                "partition key '{}' with = or IN, found {}",
                field,
                predicate.op.cql()
            )));
        }
    }
    if let Some(missing) = schema
        .partition_keys()
        .iter()
        .find(|pk| !predicates.restricts(pk))
    {
        return Err(refuse(format!("partition key '{}'", missing)));
    }

    let clause = build_where(schema, predicates)?;
    let cql = format!("DELETE FROM {}{}", schema.table(), clause.render());
    Ok(Statement::new(cql, clause.values))
}

fn is_empty_delta(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Atomic add/remove on a collection column.
///
/// For maps, `additions` is an object and `removals` is a list of keys.
pub fn build_collection_delta(
    schema: &SchemaModel,
    field: &str,
    additions: &Value,
    removals: &Value,
    key: &IndexMap<String, Value>,
) -> StatementResult<Statement> {
    let def = settable(schema, field)?;
    if !def.kind.is_collection() {
        return Err(StatementError::NotACollection {
            field: field.to_string(),
        });
    }

    let add = !is_empty_delta(additions);
    let remove = !is_empty_delta(removals);
    if !add && !remove {
        return Err(StatementError::EmptyDelta {
            field: field.to_string(),
        });
    }

    let mut assignments = Vec::with_capacity(2);
    let mut values = Vec::with_capacity(2 + key.len());
    if add {
        values.push(def.kind.encode(additions).map_err(|e| e.at_field(field))?);
        assignments.push(format!("{0} = {0} + ?", field));
    }
    if remove {
        let removal_kind = match &def.kind {
            FieldKind::Map(key_kind, _) => FieldKind::Set(key_kind.clone()),
            other => other.clone(),
        };
        values.push(removal_kind.encode(removals).map_err(|e| e.at_field(field))?);
        assignments.push(format!("{0} = {0} - ?", field));
    }

    let (key_fragments, key_values) = key_clause(schema, key)?;
    values.extend(key_values);

    let cql = format!(
        "UPDATE {} SET {} WHERE {}",
        schema.table(),
        assignments.join(", "),
        key_fragments.join(" AND ")
    );
    Ok(Statement::new(cql, values))
}

/// Wraps statements in one unlogged batch with concatenated values.
pub fn build_batch(statements: &[Statement]) -> Statement {
    let body: Vec<&str> = statements.iter().map(|s| s.cql.as_str()).collect();
    let cql = format!("BEGIN UNLOGGED BATCH {}; APPLY BATCH", body.join("; "));
    let values = statements
        .iter()
        .flat_map(|s| s.values.iter().cloned())
        .collect();
    Statement::new(cql, values)
}
