//! Shape registry
//!
//! Caches derived `SchemaModel`s by table name. Shapes arrive either
//! statically through the `Entity` trait or dynamically through
//! `declare`. Both paths go through `SchemaModel::derive`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::errors::SchemaResult;
use super::model::SchemaModel;
use super::types::FieldDef;

/// Statically declared record shape.
///
/// ```ignore
/// struct User;
///
/// impl Entity for User {
///     const TABLE: &'static str = "users";
///
///     fn fields() -> Vec<(&'static str, FieldDef)> {
///         vec![
///             ("id", FieldDef::uuid().primary_key()),
///             ("name", FieldDef::text().required()),
///         ]
///     }
/// }
/// ```
pub trait Entity {
    const TABLE: &'static str;

    fn fields() -> Vec<(&'static str, FieldDef)>;
}

/// Thread-safe cache of derived shapes
#[derive(Debug, Default)]
pub struct ShapeRegistry {
    shapes: RwLock<HashMap<String, Arc<SchemaModel>>>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached shape for `E`, deriving it on first use.
    pub fn shape<E: Entity>(&self) -> SchemaResult<Arc<SchemaModel>> {
        if let Some(model) = self.get(E::TABLE) {
            return Ok(model);
        }
        let derived = Arc::new(SchemaModel::derive(E::TABLE, E::fields())?);

        let mut shapes = self.shapes.write().unwrap_or_else(PoisonError::into_inner);
        // another caller may have won the race; keep its Arc
        let model = shapes
            .entry(E::TABLE.to_string())
            .or_insert(derived)
            .clone();
        Ok(model)
    }

    /// Derives a shape from a runtime field list and caches it.
    ///
    /// Declaring an existing name replaces the cached shape with a new `Arc`.
    /// Holders of the previous `Arc` keep their copy.
    pub fn declare<I, N, F>(&self, table: &str, fields: I) -> SchemaResult<Arc<SchemaModel>>
    where
        I: IntoIterator<Item = (N, F)>,
        N: Into<String>,
        F: Into<Arc<FieldDef>>,
    {
        let model = Arc::new(SchemaModel::derive(table, fields)?);
        self.shapes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.to_string(), Arc::clone(&model));
        Ok(model)
    }

    pub fn get(&self, table: &str) -> Option<Arc<SchemaModel>> {
        self.shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::FieldKind;

    struct User;

    impl Entity for User {
        const TABLE: &'static str = "users";

        fn fields() -> Vec<(&'static str, FieldDef)> {
            vec![
                ("id", FieldDef::uuid().primary_key()),
                ("name", FieldDef::text().required()),
            ]
        }
    }

    #[test]
    fn test_static_shape_is_cached() {
        let registry = ShapeRegistry::new();
        let first = registry.shape::<User>().unwrap();
        let second = registry.shape::<User>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_static_and_dynamic_shapes_match() {
        let registry = ShapeRegistry::new();
        let static_shape = registry.shape::<User>().unwrap();

        let other = ShapeRegistry::new();
        let dynamic = other
            .declare(
                "users",
                vec![
                    ("id", FieldDef::uuid().primary_key()),
                    ("name", FieldDef::text().required()),
                ],
            )
            .unwrap();

        assert_eq!(static_shape.partition_keys(), dynamic.partition_keys());
        assert_eq!(
            static_shape.column_names().collect::<Vec<_>>(),
            dynamic.column_names().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_redeclare_replaces_shape() {
        let registry = ShapeRegistry::new();
        let v1 = registry
            .declare("docs", vec![("id", FieldDef::int().partition_key())])
            .unwrap();
        let v2 = registry
            .declare(
                "docs",
                vec![
                    ("id", FieldDef::int().partition_key()),
                    ("tags", FieldDef::set(FieldKind::Text)),
                ],
            )
            .unwrap();

        assert_eq!(v1.fields().len(), 1);
        assert_eq!(v2.fields().len(), 2);
        assert!(Arc::ptr_eq(&registry.get("docs").unwrap(), &v2));
    }

    #[test]
    fn test_failed_declaration_is_not_cached() {
        let registry = ShapeRegistry::new();
        assert!(registry
            .declare("orphans", vec![("name", FieldDef::text())])
            .is_err());
        assert!(registry.is_empty());
    }
}
