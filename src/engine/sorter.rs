//! Client-side record sorting
//!
//! Used when an ordering cannot be pushed to the store. Values are compared
//! in their wire form so that decimals, timestamps and integers sort by
//! value rather than by text.

use std::cmp::Ordering;

use crate::schema::{CqlValue, Record};
use crate::statement::{SortDirection, SortSpec};

/// Sorts decoded records
pub struct RecordSorter;

impl RecordSorter {
    /// Sorts records in place by the sort field.
    ///
    /// Sort is stable. Nulls and unset fields sort first in ascending order.
    pub fn sort(records: &mut Vec<Record>, spec: &SortSpec) {
        let mut keyed: Vec<(CqlValue, Record)> = records
            .drain(..)
            .map(|record| (Self::sort_key(&record, &spec.field), record))
            .collect();

        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = a.compare(b).unwrap_or(Ordering::Equal);
            match spec.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        records.extend(keyed.into_iter().map(|(_, record)| record));
    }

    fn sort_key(record: &Record, field: &str) -> CqlValue {
        let (Some(def), Some(value)) = (record.schema().field(field), record.get(field)) else {
            return CqlValue::Null;
        };
        def.kind.encode(value).unwrap_or(CqlValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, SchemaModel};
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> Arc<SchemaModel> {
        Arc::new(
            SchemaModel::derive(
                "items",
                vec![
                    ("id", FieldDef::text().partition_key()),
                    ("price", FieldDef::decimal(10, 2)),
                    ("age", FieldDef::int()),
                ],
            )
            .unwrap(),
        )
    }

    fn record(id: &str, price: &str, age: Option<i64>) -> Record {
        Record::new(schema(), json!({"id": id, "price": price, "age": age})).unwrap()
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records
            .iter()
            .map(|r| r.get("id").and_then(|v| v.as_str()).unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_sort_decimal_by_value() {
        let mut records = vec![
            record("a", "10.50", Some(1)),
            record("b", "9.10", Some(2)),
            record("c", "100", Some(3)),
        ];
        RecordSorter::sort(&mut records, &SortSpec::asc("price"));
        assert_eq!(ids(&records), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_sort_descending_with_nulls() {
        let mut records = vec![
            record("a", "1", None),
            record("b", "1", Some(30)),
            record("c", "1", Some(20)),
        ];
        RecordSorter::sort(&mut records, &SortSpec::desc("age"));
        assert_eq!(ids(&records), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_stable() {
        let mut records = vec![
            record("a", "1", Some(5)),
            record("b", "1", Some(5)),
            record("c", "1", Some(5)),
        ];
        RecordSorter::sort(&mut records, &SortSpec::asc("age"));
        assert_eq!(ids(&records), vec!["a", "b", "c"]);
    }
}
