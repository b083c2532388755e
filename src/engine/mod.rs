//! Query execution subsystem for cassmap
//!
//! Runs built statements through a session and decodes rows into records.
//!
//! # Design Principles
//!
//! - One async core; the blocking surface drives it on a current-thread runtime
//! - Queries are lazy and cache each result once
//! - Client-side sorting only when the store cannot order
//! - Batch chunk failures are collected, not short-circuited

mod batch;
mod blocking;
#[allow(clippy::module_inception)]
mod engine;
mod errors;
mod model;
mod queryset;
mod sorter;

pub use batch::{bulk_insert, bulk_insert_async, plan_chunks, BatchChunk, BatchReport};
pub use blocking::BlockingEngine;
pub use engine::Engine;
pub use errors::{BatchFailure, QueryError, QueryResult};
pub use model::Model;
pub use queryset::{Page, QuerySet};
pub use sorter::RecordSorter;
