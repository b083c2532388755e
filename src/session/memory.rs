//! In-memory session for tests
//!
//! Understands the statement shapes the builder and synchronizer emit:
//! - SELECT with =, IN, range, CONTAINS and CONTAINS KEY filters, ORDER BY,
//!   `LIMIT ?`, `COUNT(*)` and paging
//! - INSERT (upsert by primary key when the table layout is known)
//! - UPDATE with plain and collection (`c = c + ?`, `c = c - ?`) assignments
//! - DELETE
//! - unlogged batches of the above
//! - CREATE TABLE, ALTER TABLE ADD and CREATE INDEX, reflected in the catalog
//! - `system_schema.columns` / `system_schema.indexes` lookups
//!
//! Keyspaces are ignored; tables are addressed by name only. Selects on
//! unknown tables return no rows.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::schema::{ClusteringOrder, CqlValue, Row};
use crate::sync::RemoteTable;

use super::{
    AsyncSession, ExecutionError, ExecutionResult, PageRequest, PagingState, PreparedStatement,
    ResultPage, Session, SessionFuture,
};

/// One statement as the session received it
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub cql: String,
    pub values: Vec<CqlValue>,
    pub page_size: Option<u32>,
    pub prepared: bool,
}

#[derive(Debug, Clone)]
enum Trigger {
    Cql(String),
    Value(CqlValue),
}

#[derive(Debug, Clone)]
struct Failure {
    trigger: Trigger,
    error: ExecutionError,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Row>>,
    catalog: HashMap<String, RemoteTable>,
    executed: Vec<ExecutedStatement>,
    failures: Vec<Failure>,
    prepared: Vec<String>,
}

/// In-memory `Session` + `AsyncSession`
#[derive(Debug, Default)]
pub struct MemorySession {
    state: Mutex<MemoryState>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a live table layout served from `system_schema`.
    pub fn define_table(&self, table: RemoteTable) {
        self.state().catalog.insert(table.name.clone(), table);
    }

    pub fn with_table(self, table: RemoteTable) -> Self {
        self.define_table(table);
        self
    }

    pub fn remote_table(&self, name: &str) -> Option<RemoteTable> {
        self.state().catalog.get(name).cloned()
    }

    /// Seeds a row without going through a statement.
    pub fn insert_row(&self, table: &str, row: Row) {
        let mut state = self.state();
        upsert(&mut state, table, row);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    /// Fails every statement whose CQL contains `pattern`.
    pub fn fail_on(&self, pattern: impl Into<String>, error: ExecutionError) {
        self.state().failures.push(Failure {
            trigger: Trigger::Cql(pattern.into()),
            error,
        });
    }

    /// Fails every statement that binds `value`.
    pub fn fail_on_value(&self, value: CqlValue, error: ExecutionError) {
        self.state().failures.push(Failure {
            trigger: Trigger::Value(value),
            error,
        });
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state().executed.clone()
    }

    pub fn executed_cql(&self) -> Vec<String> {
        self.state().executed.iter().map(|s| s.cql.clone()).collect()
    }

    /// Executions whose CQL starts with `prefix`
    pub fn count_executed(&self, prefix: &str) -> usize {
        self.state()
            .executed
            .iter()
            .filter(|s| s.cql.starts_with(prefix))
            .count()
    }

    pub fn clear_executed(&self) {
        self.state().executed.clear();
    }

    pub fn prepared_count(&self) -> usize {
        self.state().prepared.len()
    }

    fn prepare_statement(&self, cql: &str) -> PreparedStatement {
        let mut state = self.state();
        state.prepared.push(cql.to_string());
        PreparedStatement {
            id: state.prepared.len() as u64,
            cql: cql.to_string(),
        }
    }

    fn run(
        &self,
        cql: &str,
        values: &[CqlValue],
        paging: Option<&PageRequest>,
        prepared: bool,
    ) -> ExecutionResult<ResultPage> {
        let mut state = self.state();
        state.executed.push(ExecutedStatement {
            cql: cql.to_string(),
            values: values.to_vec(),
            page_size: paging.map(|p| p.page_size),
            prepared,
        });

        let triggered = state.failures.iter().find(|f| match &f.trigger {
            Trigger::Cql(pattern) => cql.contains(pattern.as_str()),
            Trigger::Value(value) => values.contains(value),
        });
        if let Some(failure) = triggered {
            return Err(failure.error.clone());
        }

        let mut binds = Binds::new(values);
        let page = dispatch(&mut state, cql, &mut binds, paging)?;
        Ok(page)
    }
}

impl Session for MemorySession {
    fn prepare(&self, cql: &str) -> ExecutionResult<PreparedStatement> {
        Ok(self.prepare_statement(cql))
    }

    fn execute(
        &self,
        prepared: &PreparedStatement,
        values: &[CqlValue],
        paging: Option<&PageRequest>,
    ) -> ExecutionResult<ResultPage> {
        self.run(&prepared.cql, values, paging, true)
    }

    fn execute_unprepared(&self, cql: &str, values: &[CqlValue]) -> ExecutionResult<ResultPage> {
        self.run(cql, values, None, false)
    }
}

impl AsyncSession for MemorySession {
    fn prepare<'a>(&'a self, cql: &'a str) -> SessionFuture<'a, PreparedStatement> {
        Box::pin(async move { Ok(self.prepare_statement(cql)) })
    }

    fn execute<'a>(
        &'a self,
        prepared: &'a PreparedStatement,
        values: &'a [CqlValue],
        paging: Option<&'a PageRequest>,
    ) -> SessionFuture<'a, ResultPage> {
        Box::pin(async move { self.run(&prepared.cql, values, paging, true) })
    }

    fn execute_unprepared<'a>(
        &'a self,
        cql: &'a str,
        values: &'a [CqlValue],
    ) -> SessionFuture<'a, ResultPage> {
        Box::pin(async move { self.run(cql, values, None, false) })
    }
}

// =============================================================================
// Statement interpretation
// =============================================================================

fn unsupported(cql: &str) -> ExecutionError {
    ExecutionError::invalid(format!("unsupported statement: {}", cql))
}

struct Binds<'v> {
    values: &'v [CqlValue],
    next: usize,
}

impl<'v> Binds<'v> {
    fn new(values: &'v [CqlValue]) -> Self {
        Self { values, next: 0 }
    }

    fn take(&mut self) -> ExecutionResult<CqlValue> {
        let value = self
            .values
            .get(self.next)
            .cloned()
            .ok_or_else(|| ExecutionError::invalid("not enough bound values"))?;
        self.next += 1;
        Ok(value)
    }
}

fn dispatch(
    state: &mut MemoryState,
    cql: &str,
    binds: &mut Binds<'_>,
    paging: Option<&PageRequest>,
) -> ExecutionResult<ResultPage> {
    if cql.starts_with("SELECT ") {
        select(state, cql, binds, paging)
    } else if cql.starts_with("INSERT INTO ") {
        insert(state, cql, binds).map(|_| ResultPage::empty())
    } else if cql.starts_with("UPDATE ") {
        update(state, cql, binds).map(|_| ResultPage::empty())
    } else if cql.starts_with("DELETE FROM ") {
        delete(state, cql, binds).map(|_| ResultPage::empty())
    } else if cql.starts_with("BEGIN ") {
        batch(state, cql, binds).map(|_| ResultPage::empty())
    } else if cql.starts_with("CREATE TABLE ") {
        create_table(state, cql).map(|_| ResultPage::empty())
    } else if cql.starts_with("ALTER TABLE ") {
        alter_table(state, cql).map(|_| ResultPage::empty())
    } else if cql.starts_with("CREATE INDEX ") {
        create_index(state, cql).map(|_| ResultPage::empty())
    } else {
        Err(unsupported(cql))
    }
}

#[derive(Debug)]
enum CondOp {
    Cmp(Ordering, bool),
    Eq,
    In,
    Contains,
    ContainsKey,
}

#[derive(Debug)]
struct Condition {
    column: String,
    op: CondOp,
    values: Vec<CqlValue>,
}

fn parse_conditions(clause: &str, binds: &mut Binds<'_>) -> ExecutionResult<Vec<Condition>> {
    let mut conditions = Vec::new();
    for part in clause.split(" AND ") {
        let (column, rest) = part
            .split_once(' ')
            .ok_or_else(|| ExecutionError::invalid(format!("bad condition: {}", part)))?;
        let (op, count) = if let Some(list) = rest.strip_prefix("IN ") {
            (CondOp::In, list.matches('?').count())
        } else {
            let op = match rest {
                "= ?" => CondOp::Eq,
                "> ?" => CondOp::Cmp(Ordering::Greater, false),
                ">= ?" => CondOp::Cmp(Ordering::Greater, true),
                "< ?" => CondOp::Cmp(Ordering::Less, false),
                "<= ?" => CondOp::Cmp(Ordering::Less, true),
                "CONTAINS ?" => CondOp::Contains,
                "CONTAINS KEY ?" => CondOp::ContainsKey,
                _ => return Err(ExecutionError::invalid(format!("bad condition: {}", part))),
            };
            (op, 1)
        };
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(binds.take()?);
        }
        conditions.push(Condition {
            column: column.to_string(),
            op,
            values,
        });
    }
    Ok(conditions)
}

fn same(a: &CqlValue, b: &CqlValue) -> bool {
    a == b || (!a.is_null() && a.compare(b) == Some(Ordering::Equal))
}

fn matches(row: &Row, conditions: &[Condition]) -> bool {
    conditions.iter().all(|cond| {
        let actual = row.get(&cond.column).unwrap_or(&CqlValue::Null);
        match &cond.op {
            CondOp::Eq => same(actual, &cond.values[0]),
            CondOp::In => cond.values.iter().any(|v| same(actual, v)),
            CondOp::Cmp(_, _) if actual.is_null() => false,
            CondOp::Cmp(direction, inclusive) => match actual.compare(&cond.values[0]) {
                Some(Ordering::Equal) => *inclusive,
                Some(ordering) => ordering == *direction,
                None => false,
            },
            CondOp::Contains => match actual {
                CqlValue::List(items) | CqlValue::Set(items) => {
                    items.iter().any(|i| same(i, &cond.values[0]))
                }
                CqlValue::Map(entries) => entries.iter().any(|(_, v)| same(v, &cond.values[0])),
                _ => false,
            },
            CondOp::ContainsKey => match actual {
                CqlValue::Map(entries) => entries.iter().any(|(k, _)| same(k, &cond.values[0])),
                _ => false,
            },
        }
    })
}

/// Splits on `sep` outside of `()` and `<>`.
fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '(' | '<' => depth += 1,
            ')' | '>' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(input[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    let tail = input[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

fn key_columns(state: &MemoryState, table: &str) -> Option<Vec<String>> {
    let remote = state.catalog.get(table)?;
    let mut keys: Vec<String> = remote
        .partition_keys()
        .into_iter()
        .map(str::to_string)
        .collect();
    keys.extend(remote.clustering_keys().into_iter().map(|(k, _)| k.to_string()));
    Some(keys)
}

fn upsert(state: &mut MemoryState, table: &str, row: Row) {
    let keys = key_columns(state, table);
    let rows = state.tables.entry(table.to_string()).or_default();
    let existing = keys.and_then(|keys| {
        rows.iter_mut().find(|r| {
            keys.iter()
                .all(|k| r.get(k).is_some() && r.get(k) == row.get(k))
        })
    });
    match existing {
        Some(current) => {
            for (column, value) in row {
                current.insert(column, value);
            }
        }
        None => rows.push(row),
    }
}

/// Rows in the order a partition scan would return them
fn natural_order(state: &MemoryState, table: &str, rows: &mut [Row]) {
    let Some(remote) = state.catalog.get(table) else {
        return;
    };
    let clustering = remote.clustering_keys();
    if clustering.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for (key, order) in &clustering {
            let left = a.get(*key).unwrap_or(&CqlValue::Null);
            let right = b.get(*key).unwrap_or(&CqlValue::Null);
            let ord = left.compare(right).unwrap_or(Ordering::Equal);
            let ord = match order {
                ClusteringOrder::Asc => ord,
                ClusteringOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn offset_of(paging: &PageRequest) -> ExecutionResult<usize> {
    match &paging.state {
        None => Ok(0),
        Some(state) => {
            let bytes: [u8; 8] = state.as_bytes().try_into().map_err(|_| {
                ExecutionError::InvalidPagingState {
                    reason: "expected 8 bytes".to_string(),
                }
            })?;
            Ok(u64::from_be_bytes(bytes) as usize)
        }
    }
}

fn select(
    state: &mut MemoryState,
    cql: &str,
    binds: &mut Binds<'_>,
    paging: Option<&PageRequest>,
) -> ExecutionResult<ResultPage> {
    let rest = &cql["SELECT ".len()..];
    let (columns, rest) = rest.split_once(" FROM ").ok_or_else(|| unsupported(cql))?;
    let (table, mut tail) = match rest.split_once(' ') {
        Some((table, tail)) => (table, tail),
        None => (rest, ""),
    };

    if let Some(catalog_table) = table.strip_prefix("system_schema.") {
        return catalog_select(state, catalog_table, columns, binds);
    }

    let mut has_limit = false;
    if let Some(t) = tail.strip_suffix("ALLOW FILTERING") {
        tail = t.trim_end();
    }
    if let Some(t) = tail.strip_suffix("LIMIT ?") {
        tail = t.trim_end();
        has_limit = true;
    }
    let mut order_by = None;
    if let Some(idx) = tail.find("ORDER BY ") {
        let spec = &tail[idx + "ORDER BY ".len()..];
        let (field, direction) = spec.split_once(' ').unwrap_or((spec, "ASC"));
        order_by = Some((field.to_string(), direction.trim() == "DESC"));
        tail = tail[..idx].trim_end();
    }
    let conditions = match tail.strip_prefix("WHERE ") {
        Some(clause) => parse_conditions(clause, binds)?,
        None if tail.is_empty() => Vec::new(),
        None => return Err(unsupported(cql)),
    };
    let limit = if has_limit {
        binds
            .take()?
            .as_i64()
            .map(|n| n.max(0) as usize)
            .ok_or_else(|| ExecutionError::invalid("LIMIT must bind an integer"))?
    } else {
        usize::MAX
    };

    let mut rows: Vec<Row> = state
        .tables
        .get(table)
        .map(|rows| rows.iter().filter(|r| matches(r, &conditions)).cloned().collect())
        .unwrap_or_default();

    if columns == "COUNT(*)" {
        let mut row = Row::new();
        row.insert("count".to_string(), CqlValue::BigInt(rows.len() as i64));
        return Ok(ResultPage {
            rows: vec![row],
            paging_state: None,
        });
    }

    natural_order(state, table, &mut rows);
    if let Some((field, descending)) = &order_by {
        rows.sort_by(|a, b| {
            let ord = a
                .get(field)
                .unwrap_or(&CqlValue::Null)
                .compare(b.get(field).unwrap_or(&CqlValue::Null))
                .unwrap_or(Ordering::Equal);
            if *descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }
    rows.truncate(limit);

    let projection: Vec<&str> = columns.split(", ").collect();
    let project = |row: &Row| -> Row {
        projection
            .iter()
            .map(|c| (c.to_string(), row.get(*c).cloned().unwrap_or(CqlValue::Null)))
            .collect()
    };

    match paging {
        None => Ok(ResultPage {
            rows: rows.iter().map(project).collect(),
            paging_state: None,
        }),
        Some(request) => {
            let offset = offset_of(request)?;
            let end = offset.saturating_add(request.page_size as usize).min(rows.len());
            let page = rows.get(offset..end).unwrap_or(&[]);
            let paging_state = (end < rows.len())
                .then(|| PagingState::from_bytes((end as u64).to_be_bytes().to_vec()));
            Ok(ResultPage {
                rows: page.iter().map(project).collect(),
                paging_state,
            })
        }
    }
}

fn catalog_select(
    state: &MemoryState,
    catalog_table: &str,
    columns: &str,
    binds: &mut Binds<'_>,
) -> ExecutionResult<ResultPage> {
    let _keyspace = binds.take()?;
    let table = binds.take()?;
    let name = table
        .as_text()
        .ok_or_else(|| ExecutionError::invalid("table_name must be text"))?;

    let Some(remote) = state.catalog.get(name) else {
        return Ok(ResultPage::empty());
    };
    let (column_rows, index_rows) = remote.to_catalog_rows();
    let rows = match catalog_table {
        "columns" => column_rows,
        "indexes" => index_rows,
        other => {
            return Err(ExecutionError::invalid(format!(
                "unknown catalog table: {}",
                other
            )))
        }
    };

    let projection: Vec<&str> = columns.split(", ").collect();
    Ok(ResultPage {
        rows: rows
            .into_iter()
            .map(|row| {
                projection
                    .iter()
                    .map(|c| (c.to_string(), row.get(*c).cloned().unwrap_or(CqlValue::Null)))
                    .collect()
            })
            .collect(),
        paging_state: None,
    })
}

fn insert(state: &mut MemoryState, cql: &str, binds: &mut Binds<'_>) -> ExecutionResult<()> {
    let rest = &cql["INSERT INTO ".len()..];
    let (table, rest) = rest.split_once(" (").ok_or_else(|| unsupported(cql))?;
    let (columns, _) = rest.split_once(") VALUES").ok_or_else(|| unsupported(cql))?;

    let mut row = Row::new();
    for column in columns.split(", ") {
        row.insert(column.to_string(), binds.take()?);
    }
    upsert(state, table, row);
    Ok(())
}

enum Assignment {
    Set(String, CqlValue),
    Add(String, CqlValue),
    Remove(String, CqlValue),
}

fn add_collection(current: CqlValue, delta: CqlValue) -> CqlValue {
    match (current, delta) {
        (CqlValue::List(mut items), CqlValue::List(more)) => {
            items.extend(more);
            CqlValue::List(items)
        }
        (CqlValue::Set(mut items), CqlValue::Set(more)) => {
            for item in more {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
            // sets are stored sorted
            items.sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
            CqlValue::Set(items)
        }
        (CqlValue::Map(mut entries), CqlValue::Map(more)) => {
            for (k, v) in more {
                match entries.iter_mut().find(|(existing, _)| *existing == k) {
                    Some(slot) => slot.1 = v,
                    None => entries.push((k, v)),
                }
            }
            CqlValue::Map(entries)
        }
        (_, delta) => delta,
    }
}

fn remove_collection(current: CqlValue, delta: CqlValue) -> CqlValue {
    let doomed = match &delta {
        CqlValue::List(items) | CqlValue::Set(items) => items.clone(),
        _ => Vec::new(),
    };
    match current {
        CqlValue::List(items) => CqlValue::List(items.into_iter().filter(|i| !doomed.contains(i)).collect()),
        CqlValue::Set(items) => CqlValue::Set(items.into_iter().filter(|i| !doomed.contains(i)).collect()),
        CqlValue::Map(entries) => CqlValue::Map(
            entries
                .into_iter()
                .filter(|(k, _)| !doomed.contains(k))
                .collect(),
        ),
        other => other,
    }
}

fn update(state: &mut MemoryState, cql: &str, binds: &mut Binds<'_>) -> ExecutionResult<()> {
    let rest = &cql["UPDATE ".len()..];
    let (table, rest) = rest.split_once(" SET ").ok_or_else(|| unsupported(cql))?;
    let (assignments, clause) = rest.split_once(" WHERE ").ok_or_else(|| unsupported(cql))?;

    let mut parsed = Vec::new();
    for part in assignments.split(", ") {
        let (column, expr) = part.split_once(" = ").ok_or_else(|| unsupported(cql))?;
        let value = binds.take()?;
        let assignment = if expr == "?" {
            Assignment::Set(column.to_string(), value)
        } else if expr == format!("{} + ?", column) {
            Assignment::Add(column.to_string(), value)
        } else if expr == format!("{} - ?", column) {
            Assignment::Remove(column.to_string(), value)
        } else {
            return Err(unsupported(cql));
        };
        parsed.push(assignment);
    }
    let conditions = parse_conditions(clause, binds)?;

    let apply = |row: &mut Row| {
        for assignment in &parsed {
            match assignment {
                Assignment::Set(c, v) => {
                    row.insert(c.clone(), v.clone());
                }
                Assignment::Add(c, v) => {
                    let current = row.shift_remove(c).unwrap_or(CqlValue::Null);
                    row.insert(c.clone(), add_collection(current, v.clone()));
                }
                Assignment::Remove(c, v) => {
                    let current = row.shift_remove(c).unwrap_or(CqlValue::Null);
                    row.insert(c.clone(), remove_collection(current, v.clone()));
                }
            }
        }
    };

    let rows = state.tables.entry(table.to_string()).or_default();
    let mut touched = false;
    for row in rows.iter_mut().filter(|r| matches(r, &conditions)) {
        apply(row);
        touched = true;
    }
    if !touched {
        // upsert: the key restrictions become the new row
        let mut row = Row::new();
        for cond in &conditions {
            if let (CondOp::Eq, Some(value)) = (&cond.op, cond.values.first()) {
                row.insert(cond.column.clone(), value.clone());
            }
        }
        apply(&mut row);
        rows.push(row);
    }
    Ok(())
}

fn delete(state: &mut MemoryState, cql: &str, binds: &mut Binds<'_>) -> ExecutionResult<()> {
    let rest = &cql["DELETE FROM ".len()..];
    let (table, clause) = rest.split_once(" WHERE ").ok_or_else(|| unsupported(cql))?;
    let conditions = parse_conditions(clause, binds)?;
    if let Some(rows) = state.tables.get_mut(table) {
        rows.retain(|r| !matches(r, &conditions));
    }
    Ok(())
}

fn batch(state: &mut MemoryState, cql: &str, binds: &mut Binds<'_>) -> ExecutionResult<()> {
    let body = cql
        .strip_prefix("BEGIN UNLOGGED BATCH ")
        .or_else(|| cql.strip_prefix("BEGIN BATCH "))
        .and_then(|b| b.strip_suffix("; APPLY BATCH"))
        .ok_or_else(|| unsupported(cql))?;
    for inner in body.split("; ") {
        dispatch(state, inner, binds, None)?;
    }
    Ok(())
}

fn create_table(state: &mut MemoryState, cql: &str) -> ExecutionResult<()> {
    let rest = &cql["CREATE TABLE ".len()..];
    let (if_not_exists, rest) = match rest.strip_prefix("IF NOT EXISTS ") {
        Some(r) => (true, r),
        None => (false, rest),
    };
    let (table, rest) = rest.split_once(" (").ok_or_else(|| unsupported(cql))?;
    let (body, options) = match (rest.find(") WITH "), rest.rfind(')')) {
        (Some(with), _) => (&rest[..with], &rest[with + ") WITH ".len()..]),
        (None, Some(close)) => (&rest[..close], ""),
        (None, None) => return Err(unsupported(cql)),
    };

    if state.catalog.contains_key(table) {
        if if_not_exists {
            return Ok(());
        }
        return Err(ExecutionError::invalid(format!("table {} already exists", table)));
    }

    let mut descending = Vec::new();
    if let Some(order) = options
        .strip_prefix("CLUSTERING ORDER BY (")
        .and_then(|o| o.strip_suffix(')'))
    {
        for item in order.split(", ") {
            if let Some((column, dir)) = item.split_once(' ') {
                if dir == "DESC" {
                    descending.push(column.to_string());
                }
            }
        }
    }

    let mut columns: Vec<(&str, &str)> = Vec::new();
    let mut partition: Vec<&str> = Vec::new();
    let mut clustering: Vec<&str> = Vec::new();
    for item in split_top_level(body, ',') {
        if let Some(pk) = item
            .strip_prefix("PRIMARY KEY (")
            .and_then(|p| p.strip_suffix(')'))
        {
            let parts = split_top_level(pk, ',');
            let mut iter = parts.into_iter();
            if let Some(first) = iter.next() {
                match first.strip_prefix('(').and_then(|f| f.strip_suffix(')')) {
                    Some(group) => partition.extend(group.split(',').map(str::trim)),
                    None => partition.push(first),
                }
            }
            clustering.extend(iter);
        } else {
            let (name, cql_type) = item.split_once(' ').ok_or_else(|| unsupported(cql))?;
            columns.push((name, cql_type));
        }
    }

    let type_of = |name: &str| {
        columns
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
            .unwrap_or("text")
    };
    let mut remote = RemoteTable::new(table);
    for pk in &partition {
        remote = remote.partition_key(*pk, type_of(*pk));
    }
    for ck in &clustering {
        let order = if descending.iter().any(|d| d == ck) {
            ClusteringOrder::Desc
        } else {
            ClusteringOrder::Asc
        };
        remote = remote.clustering_key(*ck, type_of(*ck), order);
    }
    for (name, cql_type) in &columns {
        if !partition.contains(name) && !clustering.contains(name) {
            remote = remote.column(*name, *cql_type);
        }
    }
    state.catalog.insert(table.to_string(), remote);
    Ok(())
}

fn alter_table(state: &mut MemoryState, cql: &str) -> ExecutionResult<()> {
    let rest = &cql["ALTER TABLE ".len()..];
    let (table, rest) = rest.split_once(" ADD ").ok_or_else(|| unsupported(cql))?;
    let (column, cql_type) = rest.split_once(' ').ok_or_else(|| unsupported(cql))?;

    let remote = state
        .catalog
        .remove(table)
        .ok_or_else(|| ExecutionError::invalid(format!("unconfigured table {}", table)))?;
    if remote.has_column(column) {
        let message = format!("column {} already exists in {}", column, table);
        state.catalog.insert(table.to_string(), remote);
        return Err(ExecutionError::invalid(message));
    }
    state
        .catalog
        .insert(table.to_string(), remote.column(column, cql_type));
    Ok(())
}

fn create_index(state: &mut MemoryState, cql: &str) -> ExecutionResult<()> {
    let (_, target) = cql.split_once(" ON ").ok_or_else(|| unsupported(cql))?;
    let (table, column) = target.split_once(" (").ok_or_else(|| unsupported(cql))?;
    let column = column.strip_suffix(')').ok_or_else(|| unsupported(cql))?;

    let remote = state
        .catalog
        .remove(table)
        .ok_or_else(|| ExecutionError::invalid(format!("unconfigured table {}", table)))?;
    state.catalog.insert(table.to_string(), remote.index(column));
    Ok(())
}
