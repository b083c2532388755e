//! Schema subsystem for cassmap
//!
//! Field types, derived table models, value conversion and typed records.
//!
//! # Design Principles
//!
//! - Shapes are declared once and derived into an immutable `SchemaModel`
//! - Every value crosses the wire through its field kind's codec
//! - Collections never carry null; absent collections are empty
//! - Invalid declarations fail at derivation, never at query time

mod codec;
mod errors;
mod model;
mod record;
mod registry;
mod types;
mod value;

pub use errors::{SchemaError, SchemaResult};
pub use model::{is_valid_identifier, SchemaModel};
pub use record::{Record, Row};
pub use registry::{Entity, ShapeRegistry};
pub use types::{ClusteringOrder, DefaultValue, FieldDef, FieldKind, KeyRole};
pub use value::CqlValue;
