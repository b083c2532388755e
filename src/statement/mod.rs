//! Statement builder subsystem for cassmap
//!
//! Translates predicates, orderings, limits and records into parameterized
//! CQL. Building is pure: no I/O, no shared state.
//!
//! # Design Principles
//!
//! - Deterministic: same inputs produce the same CQL and values
//! - Every value is bound, never interpolated
//! - Partition and clustering restrictions come first in WHERE
//! - Orderings the store cannot execute are reported, not emitted

mod ast;
mod builder;
mod errors;
mod explain;

pub use ast::{
    BuildWarning, FilterOp, Predicate, PredicateSet, SelectStatement, SortDirection, SortSpec,
    Statement,
};
pub use builder::{
    bind_predicate, build_batch, build_collection_delta, build_count, build_delete, build_exists,
    build_insert, build_select, build_update,
};
pub use errors::{StatementError, StatementResult};
pub use explain::{explain, ExplainPlan, OrderingMode};
