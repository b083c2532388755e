//! Typed rows
//!
//! A `Record` holds one logical value per declared field, in declaration
//! order. Construction applies defaults, enforces required fields and
//! normalizes every value through its field kind, so a built record always
//! encodes cleanly.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::errors::{SchemaError, SchemaResult};
use super::model::SchemaModel;
use super::types::FieldDef;
use super::value::CqlValue;

/// A row as returned by the store: column name to wire value
pub type Row = IndexMap<String, CqlValue>;

#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<SchemaModel>,
    values: IndexMap<String, Value>,
}

impl Record {
    /// Builds a record from a JSON object.
    ///
    /// # Errors
    ///
    /// - `UnknownField` for keys the shape does not declare
    /// - `MissingRequired` for absent required fields and key columns
    /// - `TypeMismatch` for values the field kind rejects
    pub fn new(schema: Arc<SchemaModel>, data: Value) -> SchemaResult<Self> {
        let mut supplied = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(SchemaError::type_mismatch(
                    "$root",
                    "object",
                    other.to_string(),
                ))
            }
        };

        if let Some(unknown) = supplied.keys().find(|k| schema.field(k).is_none()) {
            return Err(SchemaError::UnknownField {
                table: schema.table().to_string(),
                field: unknown.clone(),
            });
        }

        let mut values = IndexMap::with_capacity(schema.fields().len());
        for (name, def) in schema.fields() {
            let raw = supplied.remove(name).filter(|v| !v.is_null());
            let value = resolve(name, def, raw)?;
            values.insert(name.clone(), value);
        }

        Ok(Self { schema, values })
    }

    /// Decodes a store row into a record.
    ///
    /// Columns missing from the row decode as absent. Required checks are
    /// skipped since the row reflects stored state.
    pub fn from_row(schema: Arc<SchemaModel>, row: &Row) -> SchemaResult<Self> {
        let mut values = IndexMap::with_capacity(schema.fields().len());
        for (name, def) in schema.fields() {
            let value = match row.get(name) {
                Some(wire) => def.kind.decode(wire).map_err(|e| e.at_field(name))?,
                None => def.kind.empty_logical(),
            };
            values.insert(name.clone(), value);
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<SchemaModel> {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Replaces one field value after validating it.
    pub fn set(&mut self, field: &str, value: Value) -> SchemaResult<()> {
        let def = self.schema.require_field(field)?;
        let normalized = if !value.is_null() {
            normalize(field, def, &value)?
        } else if def.required || def.is_key() {
            return Err(SchemaError::MissingRequired {
                field: field.to_string(),
            });
        } else {
            def.kind.empty_logical()
        };
        self.values.insert(field.to_string(), normalized);
        Ok(())
    }

    /// Primary key columns and their values, partition keys first
    pub fn key_values(&self) -> IndexMap<String, Value> {
        self.schema
            .primary_key_columns()
            .map(|name| {
                let value = self.values.get(name).cloned().unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect()
    }

    /// Encodes every field in declaration order.
    pub fn encode(&self) -> SchemaResult<Vec<(String, CqlValue)>> {
        let mut out = Vec::with_capacity(self.values.len());
        for (name, def) in self.schema.fields() {
            let value = self.values.get(name).unwrap_or(&Value::Null);
            let wire = def.kind.encode(value).map_err(|e| e.at_field(name))?;
            out.push((name.clone(), wire));
        }
        Ok(out)
    }

    /// JSON dump of the record
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.table() == other.schema.table() && self.values == other.values
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn resolve(name: &str, def: &FieldDef, raw: Option<Value>) -> SchemaResult<Value> {
    match raw {
        Some(v) => normalize(name, def, &v),
        None => match &def.default {
            Some(default) => normalize(name, def, &default.produce()),
            None => match def.generated_value() {
                Some(generated) => Ok(generated),
                None if def.required || def.is_key() => Err(SchemaError::MissingRequired {
                    field: name.to_string(),
                }),
                None => Ok(def.kind.empty_logical()),
            },
        },
    }
}

fn normalize(name: &str, def: &FieldDef, value: &Value) -> SchemaResult<Value> {
    let wire = def.kind.encode(value).map_err(|e| e.at_field(name))?;
    def.kind.decode(&wire).map_err(|e| e.at_field(name))
}
