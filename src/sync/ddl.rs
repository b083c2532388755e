//! DDL rendering
//!
//! Statement text only. Column order follows declaration order.

use crate::schema::{ClusteringOrder, FieldDef, SchemaModel};

/// Secondary index name for a column: `<table>_<column>_idx`
pub fn index_name(table: &str, column: &str) -> String {
    format!("{}_{}_idx", table, column)
}

/// `CREATE TABLE` for a model.
///
/// `WITH CLUSTERING ORDER BY` is emitted only when a clustering key is
/// descending, and then lists every clustering key.
pub fn create_table(schema: &SchemaModel) -> String {
    let mut definitions: Vec<String> = schema
        .fields()
        .iter()
        .map(|(name, def)| format!("{} {}", name, def.kind.cql_type()))
        .collect();

    let mut primary_key = format!("({})", schema.partition_keys().join(", "));
    for (column, _) in schema.clustering_keys() {
        primary_key.push_str(", ");
        primary_key.push_str(column);
    }
    definitions.push(format!("PRIMARY KEY ({})", primary_key));

    let mut cql = format!(
        "CREATE TABLE {} ({})",
        schema.table(),
        definitions.join(", ")
    );

    if schema.has_descending_clustering() {
        let order: Vec<String> = schema
            .clustering_keys()
            .iter()
            .map(|(column, order)| format!("{} {}", column, order.as_str()))
            .collect();
        cql.push_str(&format!(" WITH CLUSTERING ORDER BY ({})", order.join(", ")));
    }

    cql
}

pub fn add_column(table: &str, column: &str, def: &FieldDef) -> String {
    format!("ALTER TABLE {} ADD {} {}", table, column, def.kind.cql_type())
}

pub fn create_index(table: &str, column: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        index_name(table, column),
        table,
        column
    )
}

/// Manual statement suggested for a column the model no longer declares
pub(crate) fn drop_hint(table: &str, column: &str) -> String {
    format!("ALTER TABLE {} DROP {}", table, column)
}

/// Renders a key tuple as `((pk, ...), ck DIR, ...)` for error messages.
pub(crate) fn render_key<P, C>(partition: &[P], clustering: &[(C, ClusteringOrder)]) -> String
where
    P: AsRef<str>,
    C: AsRef<str>,
{
    let partition: Vec<&str> = partition.iter().map(AsRef::as_ref).collect();
    let mut rendered = format!("(({})", partition.join(", "));
    for (column, order) in clustering {
        rendered.push_str(&format!(", {} {}", column.as_ref(), order.as_str()));
    }
    rendered.push(')');
    rendered
}
