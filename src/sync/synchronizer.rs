//! Schema synchronization
//!
//! Compares a model with the live table and produces the DDL that closes the
//! gap. Only additive changes are applied: tables, columns and indexes.
//! Extra remote columns and type differences are reported, never altered.
//! A primary key that differs is an error since it cannot be changed in
//! place.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::observability::Event;
use crate::schema::{CqlValue, SchemaModel};
use crate::session::{AsyncSession, Session};
use crate::statement::Statement;

use super::catalog::{describe, same_type, RemoteTable, COLUMNS_QUERY, INDEXES_QUERY};
use super::ddl;
use super::errors::{SyncError, SyncResult};
use crate::engine::{BlockingEngine, Engine};

/// Whether a sync applies its plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    DryRun,
    Apply,
}

/// Declared and live types of a shared column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnTypeMismatch {
    pub column: String,
    pub declared: String,
    pub remote: String,
}

/// DDL needed to bring a table in line with its model
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SyncPlan {
    pub table: String,
    /// Statements in execution order
    pub statements: Vec<String>,
    /// Live columns the model does not declare
    pub removable_columns: Vec<String>,
    pub type_mismatches: Vec<ColumnTypeMismatch>,
    /// True when the table does not exist yet
    pub creates_table: bool,
}

impl SyncPlan {
    /// No DDL to run
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// No DDL and nothing to report
    pub fn is_in_sync(&self) -> bool {
        self.statements.is_empty()
            && self.removable_columns.is_empty()
            && self.type_mismatches.is_empty()
    }
}

/// Plans and applies schema changes
pub struct SchemaSynchronizer;

impl SchemaSynchronizer {
    /// Computes the DDL for a model against the live table, if any.
    pub fn plan(schema: &SchemaModel, remote: Option<&RemoteTable>) -> SyncResult<SyncPlan> {
        let table = schema.table();
        let mut plan = SyncPlan {
            table: table.to_string(),
            ..SyncPlan::default()
        };

        let Some(remote) = remote else {
            plan.creates_table = true;
            plan.statements.push(ddl::create_table(schema));
            plan.statements.extend(
                schema
                    .indexed_fields()
                    .map(|column| ddl::create_index(table, column)),
            );
            return Ok(plan);
        };

        Self::check_primary_key(schema, remote)?;

        let mut indexes = Vec::new();
        for (column, def) in schema.fields() {
            match remote.columns.get(column) {
                None => plan
                    .statements
                    .push(ddl::add_column(table, column, def)),
                Some(live) => {
                    let declared = def.kind.cql_type();
                    if !same_type(&declared, &live.cql_type) {
                        plan.type_mismatches.push(ColumnTypeMismatch {
                            column: column.clone(),
                            declared,
                            remote: live.cql_type.clone(),
                        });
                    }
                }
            }
            if def.indexed && !remote.is_indexed(column) {
                indexes.push(ddl::create_index(table, column));
            }
        }
        plan.statements.extend(indexes);

        plan.removable_columns = remote
            .columns
            .keys()
            .filter(|column| schema.field(column).is_none())
            .cloned()
            .collect();

        Ok(plan)
    }

    fn check_primary_key(schema: &SchemaModel, remote: &RemoteTable) -> SyncResult<()> {
        let remote_partition = remote.partition_keys();
        let remote_clustering = remote.clustering_keys();

        let partition_matches = schema
            .partition_keys()
            .iter()
            .map(String::as_str)
            .eq(remote_partition.iter().copied());
        let clustering_matches = schema
            .clustering_keys()
            .iter()
            .map(|(name, order)| (name.as_str(), *order))
            .eq(remote_clustering.iter().copied());

        if partition_matches && clustering_matches {
            return Ok(());
        }
        Err(SyncError::IncompatiblePrimaryKey {
            table: schema.table().to_string(),
            declared: ddl::render_key(schema.partition_keys(), schema.clustering_keys()),
            remote: ddl::render_key(&remote_partition, &remote_clustering),
        })
    }

    /// Reads the live table from `system_schema`. `None` when it does not
    /// exist.
    pub async fn fetch_remote<S: AsyncSession>(
        engine: &Engine<S>,
        keyspace: &str,
        table: &str,
    ) -> SyncResult<Option<RemoteTable>> {
        let binds: Vec<CqlValue> = vec![keyspace.into(), table.into()];
        let unavailable = |e: crate::session::ExecutionError| SyncError::CatalogUnavailable {
            table: table.to_string(),
            reason: e.to_string(),
        };

        let columns = engine
            .dispatch(&Statement::new(COLUMNS_QUERY, binds.clone()))
            .await
            .map_err(unavailable)?;
        let indexes = engine
            .dispatch(&Statement::new(INDEXES_QUERY, binds))
            .await
            .map_err(unavailable)?;

        let remote = RemoteTable::from_catalog_rows(table, &columns.rows, &indexes.rows)?;
        if let Some(remote) = &remote {
            debug!(table = %table, remote = %describe(remote), "catalog read");
        }
        Ok(remote)
    }

    /// Fetches the catalog, plans, and applies the plan in `Apply` mode.
    ///
    /// The first failing statement aborts the rest. Statements already
    /// applied stay applied and are listed in the error.
    pub async fn sync_async<S: AsyncSession>(
        engine: &Engine<S>,
        schema: &SchemaModel,
        mode: SyncMode,
    ) -> SyncResult<SyncPlan> {
        let table = schema.table();
        let keyspace = engine
            .config()
            .keyspace
            .clone()
            .ok_or_else(|| SyncError::KeyspaceRequired {
                table: table.to_string(),
            })?;

        let remote = Self::fetch_remote(engine, &keyspace, table).await?;
        let plan = Self::plan(schema, remote.as_ref())?;

        info!(
            event = Event::SyncPlanned.as_str(),
            table = %table,
            statements = plan.statements.len(),
            creates_table = plan.creates_table,
            dry_run = (mode == SyncMode::DryRun),
        );
        for column in &plan.removable_columns {
            warn!(
                event = Event::RemovableColumn.as_str(),
                table = %table,
                column = %column,
                manual = %ddl::drop_hint(table, column),
                "remote column not declared by the model; not dropped",
            );
        }
        for mismatch in &plan.type_mismatches {
            warn!(
                event = Event::ColumnTypeMismatch.as_str(),
                table = %table,
                column = %mismatch.column,
                declared = %mismatch.declared,
                remote = %mismatch.remote,
                "column type differs; not altered",
            );
        }

        if mode == SyncMode::DryRun {
            return Ok(plan);
        }

        let mut applied = Vec::with_capacity(plan.statements.len());
        for statement in &plan.statements {
            match engine.dispatch_ddl(statement).await {
                Ok(_) => {
                    engine.metrics().increment_ddl_applied();
                    info!(
                        event = Event::DdlApplied.as_str(),
                        table = %table,
                        cql = %statement,
                    );
                    applied.push(statement.clone());
                }
                Err(source) => {
                    error!(
                        event = Event::DdlFailed.as_str(),
                        table = %table,
                        cql = %statement,
                        applied = applied.len(),
                        error = %source,
                    );
                    return Err(SyncError::DdlExecutionFailure {
                        statement: statement.clone(),
                        applied,
                        source,
                    });
                }
            }
        }

        Ok(plan)
    }

    /// Blocking form of `sync_async`.
    pub fn sync<S: Session>(
        engine: &BlockingEngine<S>,
        schema: &SchemaModel,
        mode: SyncMode,
    ) -> SyncResult<SyncPlan> {
        engine.run(Self::sync_async(engine.engine(), schema, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ClusteringOrder, FieldDef, FieldKind};

    fn users() -> SchemaModel {
        SchemaModel::derive(
            "users",
            vec![
                ("id", FieldDef::uuid().partition_key()),
                ("email", FieldDef::text().indexed()),
                ("age", FieldDef::int()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_plan_for_missing_table() {
        let plan = SchemaSynchronizer::plan(&users(), None).unwrap();
        assert!(plan.creates_table);
        assert_eq!(
            plan.statements,
            vec![
                "CREATE TABLE users (id uuid, email text, age int, PRIMARY KEY ((id)))".to_string(),
                "CREATE INDEX IF NOT EXISTS users_email_idx ON users (email)".to_string(),
            ]
        );
    }

    #[test]
    fn test_plan_adds_columns_and_reports_extras() {
        let remote = RemoteTable::new("users")
            .partition_key("id", "uuid")
            .column("email", "text")
            .column("legacy", "text")
            .index("email");

        let plan = SchemaSynchronizer::plan(&users(), Some(&remote)).unwrap();
        assert!(!plan.creates_table);
        assert_eq!(plan.statements, vec!["ALTER TABLE users ADD age int".to_string()]);
        assert_eq!(plan.removable_columns, vec!["legacy".to_string()]);
        assert!(plan.type_mismatches.is_empty());
    }

    #[test]
    fn test_plan_reports_type_mismatch() {
        let remote = RemoteTable::new("users")
            .partition_key("id", "uuid")
            .column("email", "text")
            .column("age", "bigint")
            .index("email");

        let plan = SchemaSynchronizer::plan(&users(), Some(&remote)).unwrap();
        assert!(plan.statements.is_empty());
        assert_eq!(
            plan.type_mismatches,
            vec![ColumnTypeMismatch {
                column: "age".into(),
                declared: "int".into(),
                remote: "bigint".into(),
            }]
        );
        assert!(!plan.is_in_sync());
    }

    #[test]
    fn test_plan_in_sync() {
        let remote = RemoteTable::new("users")
            .partition_key("id", "uuid")
            .column("email", "text")
            .column("age", "int")
            .index("email");
        let plan = SchemaSynchronizer::plan(&users(), Some(&remote)).unwrap();
        assert!(plan.is_in_sync());
    }

    #[test]
    fn test_clustering_direction_mismatch() {
        let schema = SchemaModel::derive(
            "events",
            vec![
                ("tenant", FieldDef::text().partition_key()),
                ("at", FieldDef::timestamp().clustering_key(ClusteringOrder::Desc)),
                ("attrs", FieldDef::map(FieldKind::Text, FieldKind::Int)),
            ],
        )
        .unwrap();
        let remote = RemoteTable::new("events")
            .partition_key("tenant", "text")
            .clustering_key("at", "timestamp", ClusteringOrder::Asc)
            .column("attrs", "map<text, int>");

        let err = SchemaSynchronizer::plan(&schema, Some(&remote)).unwrap_err();
        match err {
            SyncError::IncompatiblePrimaryKey { declared, remote, .. } => {
                assert_eq!(declared, "((tenant), at DESC)");
                assert_eq!(remote, "((tenant), at ASC)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_index_added_after_columns() {
        let schema = SchemaModel::derive(
            "users",
            vec![
                ("id", FieldDef::uuid().partition_key()),
                ("email", FieldDef::text().indexed()),
                ("nick", FieldDef::text().indexed()),
            ],
        )
        .unwrap();
        let remote = RemoteTable::new("users")
            .partition_key("id", "uuid")
            .column("email", "text");

        let plan = SchemaSynchronizer::plan(&schema, Some(&remote)).unwrap();
        assert_eq!(
            plan.statements,
            vec![
                "ALTER TABLE users ADD nick text".to_string(),
                "CREATE INDEX IF NOT EXISTS users_email_idx ON users (email)".to_string(),
                "CREATE INDEX IF NOT EXISTS users_nick_idx ON users (nick)".to_string(),
            ]
        );
    }
}
