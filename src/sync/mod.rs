//! Schema synchronization subsystem for cassmap
//!
//! Reads the live table layout from `system_schema`, diffs it against a
//! model and applies additive DDL.
//!
//! # Design Principles
//!
//! - Planning is pure; only `sync` touches the store
//! - Columns are added, never dropped or retyped
//! - Primary key differences are errors
//! - No rollback: a failure reports what already ran

mod catalog;
mod ddl;
mod errors;
mod synchronizer;

pub use catalog::{ColumnKind, RemoteColumn, RemoteTable};
pub use ddl::{add_column, create_index, create_table, index_name};
pub use errors::{SyncError, SyncResult};
pub use synchronizer::{ColumnTypeMismatch, SchemaSynchronizer, SyncMode, SyncPlan};
