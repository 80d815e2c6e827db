//! The checkpoint orchestrator.
//!
//! A [`Respawner`] is created once per schema: discovery runs, the deletion
//! plan is computed and every script is rendered up front. After that the
//! checkpoint is immutable and [`Respawner::reset`] only executes cached SQL,
//! on any connection to a database with the same schema.

use std::fmt;
use std::time::Instant;

use respawn_core::{
    Connection, Cx, DiscoveryError, DiscoveryErrorKind, DiscoveryStage, Error, Outcome,
    RespawnerOptions, Result, Table, TemporalTable,
};
use respawn_schema::{
    DeletionPlan, DialectAdapter, GraphBuilder, Identity, adapter_for, discover_identities,
    discover_relationships, discover_tables, discover_temporal_tables, probe_temporal_support,
};
use serde::Serialize;

/// A reusable database checkpoint.
#[derive(Clone)]
pub struct Respawner {
    options: RespawnerOptions,
    adapter: &'static dyn DialectAdapter,
    plan: DeletionPlan,
    tables_to_delete: Vec<Table>,
    relationship_count: usize,
    delete_sql: String,
    restore_sql: Option<String>,
    identities: Vec<Identity>,
    reseed_sql: Option<String>,
    temporal_tables: Vec<TemporalTable>,
}

impl fmt::Debug for Respawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Respawner")
            .field("dialect", &self.adapter.dialect())
            .field("tables_to_delete", &self.tables_to_delete)
            .field("delete_sql", &self.delete_sql)
            .field("restore_sql", &self.restore_sql)
            .field("reseed_sql", &self.reseed_sql)
            .field("temporal_tables", &self.temporal_tables)
            .finish_non_exhaustive()
    }
}

/// Serializable summary of a checkpoint, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointReport {
    pub dialect: &'static str,
    pub tables: Vec<Table>,
    pub relationships: usize,
    pub plan: DeletionPlan,
    pub delete_sql: String,
    pub restore_sql: Option<String>,
    pub identities: Vec<Identity>,
    pub reseed_sql: Option<String>,
    pub temporal_tables: Vec<TemporalTable>,
}

impl Respawner {
    /// Discover the schema reachable through `conn` and build a checkpoint.
    ///
    /// Steps, in order: table discovery, relationship discovery, planning,
    /// delete script rendering, then identity discovery (`with_reseed`) and
    /// temporal discovery (`check_temporal_tables`, when the server supports
    /// it). Any failure aborts creation; no partial checkpoint exists.
    #[tracing::instrument(level = "info", skip_all, fields(dialect = options.db_adapter().as_str()))]
    pub async fn create<C: Connection>(
        cx: &Cx,
        conn: &C,
        options: RespawnerOptions,
    ) -> Outcome<Self, Error> {
        let started = Instant::now();
        let adapter = adapter_for(options.db_adapter());

        let tables = match discover_tables(cx, conn, adapter, &options).await {
            Outcome::Ok(tables) => tables,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        if tables.is_empty() {
            return Outcome::Err(Error::Discovery(DiscoveryError {
                stage: DiscoveryStage::Tables,
                kind: DiscoveryErrorKind::NoTables,
                message: "No tables found. Ensure the target database has tables and that the \
                          table and schema filters select at least one."
                    .to_string(),
                sql: Some(adapter.build_table_command_text(&options)),
                source: None,
            }));
        }

        let relationships = match discover_relationships(cx, conn, adapter, &options).await {
            Outcome::Ok(relationships) => relationships,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let relationship_count = relationships.len();

        let plan = GraphBuilder::new(tables, relationships).plan();
        let delete_sql = adapter.build_delete_command_text(&plan, &options);
        let restore_sql = adapter.build_restore_command_text(&plan);
        let restore_sql = (!restore_sql.is_empty()).then_some(restore_sql);

        let mut identities = Vec::new();
        let mut reseed_sql = None;
        if options.with_reseed() {
            identities = match discover_identities(cx, conn, adapter, &options).await {
                Outcome::Ok(identities) => identities,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            identities.retain(|i| plan.contains(&i.table));
            let script = adapter.build_reseed_command_text(&identities);
            if !script.is_empty() {
                reseed_sql = Some(script);
            }
        }

        let mut temporal_tables = Vec::new();
        if options.check_temporal_tables() && adapter.supports_temporal_tables() {
            let supported = match probe_temporal_support(cx, conn, adapter).await {
                Outcome::Ok(supported) => supported,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if supported {
                temporal_tables =
                    match discover_temporal_tables(cx, conn, adapter, &options).await {
                        Outcome::Ok(temporal) => temporal,
                        Outcome::Err(e) => return Outcome::Err(e),
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    };
                temporal_tables.retain(|t| plan.contains(&t.table));
            } else {
                tracing::debug!("Server does not support temporal tables; skipping");
            }
        }

        let tables_to_delete: Vec<Table> = plan.tables().cloned().collect();
        tracing::info!(
            tables = tables_to_delete.len(),
            relationships = relationship_count,
            suspended = plan.suspended_tables().len(),
            identities = identities.len(),
            temporal_tables = temporal_tables.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Checkpoint ready"
        );

        Outcome::Ok(Self {
            options,
            adapter,
            plan,
            tables_to_delete,
            relationship_count,
            delete_sql,
            restore_sql,
            identities,
            reseed_sql,
            temporal_tables,
        })
    }

    /// Empty every table of the checkpoint.
    ///
    /// Turns system versioning off (if temporal tables were found), runs the
    /// delete script, runs the reseed script, and always tries to turn system
    /// versioning back on. When the delete script fails, its constraint
    /// restore section is run on its own. The first error wins. A failed or
    /// cancelled reset may leave tables partially emptied.
    #[tracing::instrument(level = "info", skip_all, fields(dialect = self.adapter.dialect()))]
    pub async fn reset<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<(), Error> {
        let started = Instant::now();

        if !self.temporal_tables.is_empty() {
            let sql = match self
                .adapter
                .build_turn_off_system_versioning_command_text(&self.temporal_tables)
            {
                Ok(sql) => sql,
                Err(e) => return Outcome::Err(e),
            };
            match run(cx, conn, &sql).await {
                Outcome::Ok(()) => {}
                other => return other,
            }
        }

        let result = self.delete_and_reseed(cx, conn).await;

        if !self.temporal_tables.is_empty() {
            let restored = match self
                .adapter
                .build_turn_on_system_versioning_command_text(&self.temporal_tables)
            {
                Ok(sql) => run(cx, conn, &sql).await,
                Err(e) => Outcome::Err(e),
            };
            match (&result, restored) {
                (Outcome::Ok(()), restored) => return restored,
                (_, Outcome::Ok(())) => {}
                (_, Outcome::Err(e)) => {
                    tracing::warn!(error = %e, "Failed to turn system versioning back on");
                }
                (_, _) => tracing::warn!("System versioning restore did not complete"),
            }
        }

        if matches!(result, Outcome::Ok(())) {
            tracing::info!(
                tables = self.tables_to_delete.len(),
                elapsed_ms = started.elapsed().as_millis(),
                "Reset complete"
            );
        }
        result
    }

    async fn delete_and_reseed<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<(), Error> {
        match run(cx, conn, &self.delete_sql).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => {
                self.restore_constraints(cx, conn).await;
                return Outcome::Err(e);
            }
            other => return other,
        }
        match &self.reseed_sql {
            Some(sql) => run(cx, conn, sql).await,
            None => Outcome::Ok(()),
        }
    }

    // The delete script stops at its first failing statement, before the
    // restore section.
    async fn restore_constraints<C: Connection>(&self, cx: &Cx, conn: &C) {
        let Some(sql) = &self.restore_sql else {
            return;
        };
        match run(cx, conn, sql).await {
            Outcome::Ok(()) => tracing::debug!("Restored constraints after a failed delete"),
            Outcome::Err(e) => {
                tracing::warn!(error = %e, "Failed to restore constraints after a failed delete");
            }
            _ => tracing::warn!("Constraint restore did not complete"),
        }
    }

    /// The options the checkpoint was created with.
    pub fn options(&self) -> &RespawnerOptions {
        &self.options
    }

    /// The computed deletion plan.
    pub fn plan(&self) -> &DeletionPlan {
        &self.plan
    }

    /// Tables emptied by `reset`, in delete order.
    pub fn tables_to_delete(&self) -> &[Table] {
        &self.tables_to_delete
    }

    /// The cached delete script. Log it when a reset fails.
    pub fn delete_sql(&self) -> &str {
        &self.delete_sql
    }

    /// Statements re-enabling referential integrity, also the tail of `delete_sql`.
    pub fn restore_sql(&self) -> Option<&str> {
        self.restore_sql.as_deref()
    }

    /// The cached reseed script, if reseeding was requested and anything has a counter.
    pub fn reseed_sql(&self) -> Option<&str> {
        self.reseed_sql.as_deref()
    }

    /// Identity counters reset after the delete.
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// System-versioned tables toggled around the delete.
    pub fn temporal_tables(&self) -> &[TemporalTable] {
        &self.temporal_tables
    }

    /// A serializable summary of the checkpoint.
    pub fn report(&self) -> CheckpointReport {
        CheckpointReport {
            dialect: self.adapter.dialect(),
            tables: self.tables_to_delete.clone(),
            relationships: self.relationship_count,
            plan: self.plan.clone(),
            delete_sql: self.delete_sql.clone(),
            restore_sql: self.restore_sql.clone(),
            identities: self.identities.clone(),
            reseed_sql: self.reseed_sql.clone(),
            temporal_tables: self.temporal_tables.clone(),
        }
    }

    /// The report as pretty-printed JSON.
    pub fn report_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.report())
            .map_err(|e| Error::Custom(format!("failed to serialize checkpoint report: {e}")))
    }
}

async fn run<C: Connection>(cx: &Cx, conn: &C, sql: &str) -> Outcome<(), Error> {
    match conn.execute(cx, sql).await {
        Outcome::Ok(_) => Outcome::Ok(()),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}
