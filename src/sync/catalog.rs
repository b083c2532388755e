//! Remote table descriptors read from `system_schema`
//!
//! Descriptors are fetched on every sync call and never cached.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::schema::{ClusteringOrder, CqlValue, Row};

use super::errors::{SyncError, SyncResult};

pub(crate) const COLUMNS_QUERY: &str = "SELECT column_name, type, kind, position, clustering_order \
     FROM system_schema.columns WHERE keyspace_name = ? AND table_name = ?";

pub(crate) const INDEXES_QUERY: &str =
    "SELECT index_name, options FROM system_schema.indexes WHERE keyspace_name = ? AND table_name = ?";

/// Column role as reported by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    PartitionKey,
    Clustering,
    Regular,
    Static,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::PartitionKey => "partition_key",
            ColumnKind::Clustering => "clustering",
            ColumnKind::Regular => "regular",
            ColumnKind::Static => "static",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "partition_key" => Some(ColumnKind::PartitionKey),
            "clustering" => Some(ColumnKind::Clustering),
            "regular" => Some(ColumnKind::Regular),
            "static" => Some(ColumnKind::Static),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteColumn {
    pub name: String,
    pub cql_type: String,
    pub kind: ColumnKind,
    /// Position within the partition or clustering key, -1 otherwise
    pub position: i32,
    pub clustering_order: Option<ClusteringOrder>,
}

/// Live table layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTable {
    pub name: String,
    pub columns: IndexMap<String, RemoteColumn>,
    pub indexed_columns: BTreeSet<String>,
}

impl RemoteTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
            indexed_columns: BTreeSet::new(),
        }
    }

    pub fn partition_key(self, name: &str, cql_type: &str) -> Self {
        let position = self.count(ColumnKind::PartitionKey);
        self.with_column(name, cql_type, ColumnKind::PartitionKey, position, None)
    }

    pub fn clustering_key(self, name: &str, cql_type: &str, order: ClusteringOrder) -> Self {
        let position = self.count(ColumnKind::Clustering);
        self.with_column(name, cql_type, ColumnKind::Clustering, position, Some(order))
    }

    pub fn column(self, name: &str, cql_type: &str) -> Self {
        self.with_column(name, cql_type, ColumnKind::Regular, -1, None)
    }

    pub fn index(mut self, column: &str) -> Self {
        self.indexed_columns.insert(column.to_string());
        self
    }

    fn count(&self, kind: ColumnKind) -> i32 {
        self.columns.values().filter(|c| c.kind == kind).count() as i32
    }

    fn with_column(
        mut self,
        name: &str,
        cql_type: &str,
        kind: ColumnKind,
        position: i32,
        clustering_order: Option<ClusteringOrder>,
    ) -> Self {
        self.columns.insert(
            name.to_string(),
            RemoteColumn {
                name: name.to_string(),
                cql_type: cql_type.to_string(),
                kind,
                position,
                clustering_order,
            },
        );
        self
    }

    /// Partition key names by position
    pub fn partition_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&RemoteColumn> = self
            .columns
            .values()
            .filter(|c| c.kind == ColumnKind::PartitionKey)
            .collect();
        keys.sort_by_key(|c| c.position);
        keys.into_iter().map(|c| c.name.as_str()).collect()
    }

    /// Clustering key names and directions by position
    pub fn clustering_keys(&self) -> Vec<(&str, ClusteringOrder)> {
        let mut keys: Vec<&RemoteColumn> = self
            .columns
            .values()
            .filter(|c| c.kind == ColumnKind::Clustering)
            .collect();
        keys.sort_by_key(|c| c.position);
        keys.into_iter()
            .map(|c| {
                (
                    c.name.as_str(),
                    c.clustering_order.unwrap_or(ClusteringOrder::Asc),
                )
            })
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn is_indexed(&self, name: &str) -> bool {
        self.indexed_columns.contains(name)
    }

    /// Builds a descriptor from `system_schema` rows.
    ///
    /// Returns `None` when the table has no columns, i.e. does not exist.
    pub fn from_catalog_rows(
        table: &str,
        column_rows: &[Row],
        index_rows: &[Row],
    ) -> SyncResult<Option<Self>> {
        if column_rows.is_empty() {
            return Ok(None);
        }

        let malformed = |what: &str| SyncError::CatalogUnavailable {
            table: table.to_string(),
            reason: format!("malformed catalog row: {}", what),
        };

        let mut remote = RemoteTable::new(table);
        for row in column_rows {
            let name = text_column(row, "column_name").ok_or_else(|| malformed("column_name"))?;
            let cql_type = text_column(row, "type").ok_or_else(|| malformed("type"))?;
            let kind = text_column(row, "kind")
                .and_then(ColumnKind::parse)
                .ok_or_else(|| malformed("kind"))?;
            let position = row
                .get("position")
                .and_then(CqlValue::as_i64)
                .unwrap_or(-1) as i32;
            let clustering_order = match text_column(row, "clustering_order") {
                Some(o) if o.eq_ignore_ascii_case("desc") => Some(ClusteringOrder::Desc),
                Some(o) if o.eq_ignore_ascii_case("asc") => Some(ClusteringOrder::Asc),
                _ => None,
            };

            remote.columns.insert(
                name.to_string(),
                RemoteColumn {
                    name: name.to_string(),
                    cql_type: cql_type.to_string(),
                    kind,
                    position,
                    clustering_order,
                },
            );
        }

        for row in index_rows {
            if let Some(target) = index_target(row) {
                remote.indexed_columns.insert(target);
            }
        }

        Ok(Some(remote))
    }

    /// Renders the descriptor as `system_schema` rows.
    pub(crate) fn to_catalog_rows(&self) -> (Vec<Row>, Vec<Row>) {
        let columns = self
            .columns
            .values()
            .map(|c| {
                let mut row = Row::new();
                row.insert("column_name".into(), CqlValue::from(c.name.as_str()));
                row.insert("type".into(), CqlValue::from(c.cql_type.as_str()));
                row.insert("kind".into(), CqlValue::from(c.kind.as_str()));
                row.insert("position".into(), CqlValue::Int(c.position));
                let order = match c.clustering_order {
                    Some(ClusteringOrder::Asc) => "asc",
                    Some(ClusteringOrder::Desc) => "desc",
                    None => "none",
                };
                row.insert("clustering_order".into(), CqlValue::from(order));
                row
            })
            .collect();

        let indexes = self
            .indexed_columns
            .iter()
            .map(|col| {
                let mut row = Row::new();
                row.insert(
                    "index_name".into(),
                    CqlValue::Text(format!("{}_{}_idx", self.name, col)),
                );
                row.insert(
                    "options".into(),
                    CqlValue::Map(vec![(CqlValue::from("target"), CqlValue::from(col.as_str()))]),
                );
                row
            })
            .collect();

        (columns, indexes)
    }
}

/// Compares CQL type strings ignoring case and whitespace
pub(crate) fn same_type(a: &str, b: &str) -> bool {
    let normalize = |s: &str| -> String {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect()
    };
    normalize(a) == normalize(b)
}

fn text_column<'r>(row: &'r Row, name: &str) -> Option<&'r str> {
    row.get(name).and_then(CqlValue::as_text)
}

/// Extracts the indexed column from an index row's `options['target']`.
///
/// Collection indexes report targets such as `values(tags)`.
fn index_target(row: &Row) -> Option<String> {
    let options = match row.get("options")? {
        CqlValue::Map(entries) => entries,
        _ => return None,
    };
    let target = options
        .iter()
        .find(|(k, _)| k.as_text() == Some("target"))
        .and_then(|(_, v)| v.as_text())?;

    let inner = match (target.find('('), target.ends_with(')')) {
        (Some(open), true) => &target[open + 1..target.len() - 1],
        _ => target,
    };
    Some(inner.trim_matches('"').to_string())
}

/// Summary used in logs and explain output
pub(crate) fn describe(remote: &RemoteTable) -> Value {
    serde_json::json!({
        "table": remote.name,
        "columns": remote.columns.len(),
        "partition_keys": remote.partition_keys(),
        "indexed": remote.indexed_columns.iter().collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RemoteTable {
        RemoteTable::new("events")
            .partition_key("tenant", "text")
            .clustering_key("at", "timestamp", ClusteringOrder::Desc)
            .column("tags", "set<text>")
            .index("tags")
    }

    #[test]
    fn test_catalog_rows_round_trip() {
        let remote = sample();
        let (columns, indexes) = remote.to_catalog_rows();
        let parsed = RemoteTable::from_catalog_rows("events", &columns, &indexes)
            .unwrap()
            .unwrap();
        assert_eq!(parsed, remote);
        assert_eq!(parsed.clustering_keys(), vec![("at", ClusteringOrder::Desc)]);
    }

    #[test]
    fn test_missing_table_is_none() {
        assert!(RemoteTable::from_catalog_rows("ghost", &[], &[])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_wrapped_index_target() {
        let mut row = Row::new();
        row.insert(
            "options".into(),
            CqlValue::Map(vec![(CqlValue::from("target"), CqlValue::from("values(tags)"))]),
        );
        assert_eq!(index_target(&row), Some("tags".to_string()));
    }

    #[test]
    fn test_malformed_row_reported() {
        let mut row = Row::new();
        row.insert("column_name".into(), CqlValue::from("id"));
        let err = RemoteTable::from_catalog_rows("t", &[row], &[]).unwrap_err();
        assert_eq!(err.code(), "CASSMAP_CATALOG_UNAVAILABLE");
    }

    #[test]
    fn test_same_type_ignores_spacing() {
        assert!(same_type("map<text, int>", "map<text,int>"));
        assert!(!same_type("int", "bigint"));
    }
}
