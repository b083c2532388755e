//! Explain output for built selects
//!
//! Produces deterministic, human-readable descriptions without touching the wire.

use serde::Serialize;
use std::fmt;

use super::ast::{SelectStatement, SortSpec};

/// Where an ordering is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingMode {
    None,
    Store,
    Client,
}

impl OrderingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderingMode::None => "NONE",
            OrderingMode::Store => "STORE",
            OrderingMode::Client => "CLIENT",
        }
    }
}

/// Explain plan output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainPlan {
    pub table: String,
    pub cql: String,
    pub bound_values: usize,
    pub allow_filtering: bool,
    pub ordering: OrderingMode,
    pub sort: Option<String>,
    pub page_size: Option<u32>,
    pub warnings: Vec<String>,
}

/// Describes the statement `build_select` produced.
pub fn explain(table: &str, select: &SelectStatement, ordering: Option<&SortSpec>) -> ExplainPlan {
    let statement = &select.statement;
    let mode = match (ordering, select.ordering_pushed) {
        (None, _) => OrderingMode::None,
        (Some(_), true) => OrderingMode::Store,
        (Some(_), false) => OrderingMode::Client,
    };

    ExplainPlan {
        table: table.to_string(),
        cql: statement.cql.clone(),
        bound_values: statement.values.len(),
        allow_filtering: statement.cql.ends_with("ALLOW FILTERING"),
        ordering: mode,
        sort: ordering.map(|s| format!("{} {}", s.field, s.direction.as_str())),
        page_size: statement.paging.as_ref().map(|p| p.page_size),
        warnings: select.warnings.iter().map(ToString::to_string).collect(),
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN ===")?;
        writeln!(f, "Table: {}", self.table)?;
        writeln!(f, "CQL: {}", self.cql)?;
        writeln!(f, "Bound Values: {}", self.bound_values)?;
        writeln!(
            f,
            "Allow Filtering: {}",
            if self.allow_filtering { "YES" } else { "NO" }
        )?;
        if let Some(sort) = &self.sort {
            writeln!(f, "Sort: {} ({})", sort, self.ordering.as_str())?;
        }
        if let Some(size) = self.page_size {
            writeln!(f, "Page Size: {}", size)?;
        }
        if !self.warnings.is_empty() {
            writeln!(f, "Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  - {}", warning)?;
            }
        }
        Ok(())
    }
}
