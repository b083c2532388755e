//! cassmap - A schema-aware object mapper for wide-column stores
//!
//! Declare a record shape once; cassmap keeps the remote table in line with
//! it and turns filter/sort/limit requests into parameterized CQL, executed
//! blocking or non-blocking through a caller-supplied session.

pub mod config;
pub mod engine;
pub mod observability;
pub mod schema;
pub mod session;
pub mod statement;
pub mod sync;

pub use config::{ConfigError, EngineConfig};
pub use engine::{BlockingEngine, Engine, Model, Page, QueryError, QueryResult, QuerySet};
pub use schema::{
    ClusteringOrder, CqlValue, Entity, FieldDef, FieldKind, Record, SchemaError, SchemaModel,
    ShapeRegistry,
};
pub use session::{AsyncSession, Blocking, ExecutionError, MemorySession, Session};
pub use statement::{Predicate, SortSpec};
pub use sync::{SchemaSynchronizer, SyncError, SyncMode, SyncPlan};
