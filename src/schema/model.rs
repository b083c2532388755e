//! Schema model derivation
//!
//! A `SchemaModel` is derived once per record shape and never mutated.
//! Derivation:
//! - validates table and field identifiers
//! - rejects duplicate names
//! - rejects nested collections and collection keys
//! - rejects fields that are both required and defaulted
//! - splits fields into partition keys, clustering keys and plain columns

use indexmap::IndexMap;
use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::errors::{SchemaError, SchemaResult};
use super::types::{ClusteringOrder, FieldDef, KeyRole};

static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();

/// Returns true if `name` is usable as an unquoted CQL identifier.
///
/// Only lower case is accepted. The store folds unquoted names to lower
/// case, so a mixed-case name would never match its own catalog entry.
pub fn is_valid_identifier(name: &str) -> bool {
    let pattern = IDENTIFIER.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]{0,47}$").ok());
    match pattern {
        Some(re) => re.is_match(name),
        None => false,
    }
}

/// Derived, read-only description of a table
#[derive(Debug, Clone)]
pub struct SchemaModel {
    table: String,
    fields: IndexMap<String, Arc<FieldDef>>,
    partition_keys: Vec<String>,
    clustering_keys: Vec<(String, ClusteringOrder)>,
}

impl SchemaModel {
    /// Derives a model from a table name and fields in declaration order.
    pub fn derive<I, N, F>(table: impl Into<String>, fields: I) -> SchemaResult<Self>
    where
        I: IntoIterator<Item = (N, F)>,
        N: Into<String>,
        F: Into<Arc<FieldDef>>,
    {
        let table = table.into();
        if !is_valid_identifier(&table) {
            return Err(SchemaError::InvalidIdentifier { name: table });
        }

        let mut declared: IndexMap<String, Arc<FieldDef>> = IndexMap::new();
        let mut partition_keys = Vec::new();
        let mut clustering_keys = Vec::new();

        for (name, def) in fields {
            let name = name.into();
            let def = def.into();

            if !is_valid_identifier(&name) {
                return Err(SchemaError::InvalidIdentifier { name });
            }
            if declared.contains_key(&name) {
                return Err(SchemaError::DuplicateField {
                    table: table.clone(),
                    field: name,
                });
            }
            if let Some(outer) = def.kind.nested_collection() {
                return Err(SchemaError::UnsupportedNesting { field: name, outer });
            }
            if def.is_key() && def.kind.is_collection() {
                return Err(SchemaError::CollectionKey { field: name });
            }
            if def.required && def.default.is_some() {
                return Err(SchemaError::ConflictingDefault { field: name });
            }

            match def.key {
                KeyRole::Partition => partition_keys.push(name.clone()),
                KeyRole::Clustering(order) => clustering_keys.push((name.clone(), order)),
                KeyRole::None => {}
            }
            declared.insert(name, def);
        }

        if partition_keys.is_empty() {
            return Err(SchemaError::NoPartitionKey { table });
        }

        Ok(Self {
            table,
            fields: declared,
            partition_keys,
            clustering_keys,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &IndexMap<String, Arc<FieldDef>> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldDef>> {
        self.fields.get(name)
    }

    /// Looks up a field, failing with `UnknownField`.
    pub fn require_field(&self, name: &str) -> SchemaResult<&Arc<FieldDef>> {
        self.fields.get(name).ok_or_else(|| SchemaError::UnknownField {
            table: self.table.clone(),
            field: name.to_string(),
        })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn partition_keys(&self) -> &[String] {
        &self.partition_keys
    }

    pub fn clustering_keys(&self) -> &[(String, ClusteringOrder)] {
        &self.clustering_keys
    }

    /// Partition keys followed by clustering keys
    pub fn primary_key_columns(&self) -> impl Iterator<Item = &str> {
        self.partition_keys
            .iter()
            .map(String::as_str)
            .chain(self.clustering_keys.iter().map(|(name, _)| name.as_str()))
    }

    pub fn is_partition_key(&self, name: &str) -> bool {
        self.partition_keys.iter().any(|k| k == name)
    }

    pub fn is_clustering_key(&self, name: &str) -> bool {
        self.clustering_keys.iter().any(|(k, _)| k == name)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.is_partition_key(name) || self.is_clustering_key(name)
    }

    pub fn is_indexed(&self, name: &str) -> bool {
        self.fields.get(name).map(|f| f.indexed).unwrap_or(false)
    }

    pub fn indexed_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, def)| def.indexed)
            .map(|(name, _)| name.as_str())
    }

    /// Declared order of a clustering key
    pub fn clustering_order_of(&self, name: &str) -> Option<ClusteringOrder> {
        self.clustering_keys
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, order)| *order)
    }

    /// True if any clustering key is stored descending
    pub fn has_descending_clustering(&self) -> bool {
        self.clustering_keys
            .iter()
            .any(|(_, order)| *order == ClusteringOrder::Desc)
    }
}
