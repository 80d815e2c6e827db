//! Dialect adapters.
//!
//! An adapter turns options and plans into SQL text for one engine. It performs
//! no I/O; the orchestrator runs what it returns. Discovery queries return
//! columns with fixed names so [`crate::introspect`] can decode every engine the
//! same way:
//!
//! | Query | Columns |
//! |-------|---------|
//! | tables | `table_schema`, `table_name` |
//! | relationships | `parent_schema`, `parent_table`, `referenced_schema`, `referenced_table`, `constraint_name` |
//! | identities | `table_schema`, `table_name`, optional `sequence_schema`, `sequence_name` |
//! | temporal tables | `table_schema`, `table_name`, `history_schema`, `history_table` |
//!
//! Filters are rendered as case-insensitive `LOWER(..) [NOT] IN (..)`
//! predicates. Relationship queries apply them to both ends.

mod mysql;
mod postgres;
mod sqlite;
mod sqlserver;

pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;
pub use sqlserver::SqlServerAdapter;

use respawn_core::identifiers::{normalize_ident, strip_quotes};
use respawn_core::{
    DbAdapter, Error, IdentifierQuotes, RespawnerOptions, Result, SchemaFilter, Table,
    TableFilter, TemporalTable, quote_ident, quote_literal,
};

use crate::graph::DeletionPlan;
use crate::introspect::Identity;

/// Engine-specific SQL generation.
pub trait DialectAdapter: Send + Sync {
    /// The engine this adapter renders for.
    fn adapter(&self) -> DbAdapter;

    /// Dialect name used in log fields.
    fn dialect(&self) -> &'static str {
        self.adapter().as_str()
    }

    /// Identifier quote characters.
    fn quotes(&self) -> IdentifierQuotes;

    /// Quote an identifier. Quotes already present on `ident` are replaced.
    fn quote_identifier(&self, ident: &str) -> String {
        quote_ident(strip_quotes(ident), self.quotes())
    }

    /// Quote a table as `schema.name` (or `name` when unqualified).
    fn qualified_name(&self, table: &Table) -> String {
        match table.schema() {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(table.name())
            ),
            None => self.quote_identifier(table.name()),
        }
    }

    /// SQL expression joining a schema and a name expression with a `.`.
    fn concat_qualified(&self, schema_expr: &str, name_expr: &str) -> String {
        format!("{schema_expr} || '.' || {name_expr}")
    }

    /// Table discovery query.
    fn build_table_command_text(&self, options: &RespawnerOptions) -> String;

    /// Foreign-key discovery query.
    fn build_relationship_command_text(&self, options: &RespawnerOptions) -> String;

    /// Statements that suspend referential integrity before the deletes.
    fn suspend_constraints(&self, plan: &DeletionPlan) -> Vec<String>;

    /// Statements that restore referential integrity after the deletes.
    fn restore_constraints(&self, plan: &DeletionPlan) -> Vec<String>;

    /// The statement that empties one table.
    fn delete_statement(&self, table: &Table, options: &RespawnerOptions) -> String {
        match options.format_delete_statement() {
            Some(format) => format(table),
            None => format!("DELETE FROM {};", self.qualified_name(table)),
        }
    }

    /// The full delete script: suspension, one delete per table in plan order,
    /// restoration. One statement per line.
    fn build_delete_command_text(&self, plan: &DeletionPlan, options: &RespawnerOptions) -> String {
        let mut script = String::new();
        let statements = self
            .suspend_constraints(plan)
            .into_iter()
            .chain(plan.tables().map(|t| self.delete_statement(t, options)))
            .chain(self.restore_constraints(plan));
        for statement in statements {
            tracing::trace!(dialect = self.dialect(), sql = %statement, "Delete statement");
            script.push_str(&statement);
            script.push('\n');
        }
        tracing::debug!(
            dialect = self.dialect(),
            tables = plan.len(),
            suspended = plan.suspended_tables().len(),
            "Rendered delete script"
        );
        script
    }

    /// The restore section of the delete script on its own, run when a reset
    /// fails before reaching it. Empty when nothing is suspended.
    fn build_restore_command_text(&self, plan: &DeletionPlan) -> String {
        self.restore_constraints(plan)
            .into_iter()
            .map(|statement| statement + "\n")
            .collect()
    }

    /// Identity/sequence discovery query; `None` when the engine has no counters to reset.
    fn build_identity_command_text(&self, options: &RespawnerOptions) -> Option<String>;

    /// Script that resets the counters of `identities`. Empty when there is nothing to reset.
    fn build_reseed_command_text(&self, identities: &[Identity]) -> String;

    /// Query answering whether the server supports system-versioned tables.
    /// `None` means the engine never does.
    fn build_temporal_support_command_text(&self) -> Option<String> {
        None
    }

    /// Whether the engine has system-versioned tables at all.
    fn supports_temporal_tables(&self) -> bool {
        self.build_temporal_support_command_text().is_some()
    }

    /// Temporal table discovery query.
    fn build_temporal_table_command_text(&self, _options: &RespawnerOptions) -> Result<String> {
        Err(Error::unsupported(self.adapter(), "temporal tables"))
    }

    fn build_turn_off_system_versioning_command_text(
        &self,
        _tables: &[TemporalTable],
    ) -> Result<String> {
        Err(Error::unsupported(self.adapter(), "system versioning"))
    }

    fn build_turn_on_system_versioning_command_text(
        &self,
        _tables: &[TemporalTable],
    ) -> Result<String> {
        Err(Error::unsupported(self.adapter(), "system versioning"))
    }
}

static SQLITE: SqliteAdapter = SqliteAdapter;
static POSTGRES: PostgresAdapter = PostgresAdapter;
static MYSQL: MySqlAdapter = MySqlAdapter;
static SQLSERVER: SqlServerAdapter = SqlServerAdapter;

/// The adapter for a configured engine.
pub fn adapter_for(adapter: DbAdapter) -> &'static dyn DialectAdapter {
    match adapter {
        DbAdapter::Sqlite => &SQLITE,
        DbAdapter::Postgres => &POSTGRES,
        DbAdapter::MySql => &MYSQL,
        DbAdapter::SqlServer => &SQLSERVER,
    }
}

/// Catalog expressions holding a table's schema and name in some query.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CatalogColumns<'a> {
    pub schema: &'a str,
    pub name: &'a str,
}

/// Render the table and schema filters of `options` against `cols`.
///
/// Returns predicates meant to be joined with `AND`. Exclusions keep rows whose
/// schema is NULL, matching [`RespawnerOptions::admits`] for unqualified tables.
pub(crate) fn filter_predicates<A: DialectAdapter + ?Sized>(
    adapter: &A,
    options: &RespawnerOptions,
    cols: CatalogColumns<'_>,
) -> Vec<String> {
    let mut predicates = Vec::new();
    let qualified = || format!("LOWER({})", adapter.concat_qualified(cols.schema, cols.name));
    let name = || format!("LOWER({})", cols.name);

    match options.table_filter() {
        TableFilter::All => {}
        TableFilter::Include(tables) => {
            let (with_schema, bare) = split_by_schema(tables);
            let mut alternatives = Vec::new();
            if !bare.is_empty() {
                alternatives.push(format!("{} IN ({})", name(), bare.join(", ")));
            }
            if !with_schema.is_empty() {
                alternatives.push(format!("{} IN ({})", qualified(), with_schema.join(", ")));
            }
            if alternatives.len() == 1 {
                predicates.push(alternatives.remove(0));
            } else {
                predicates.push(format!("({})", alternatives.join(" OR ")));
            }
        }
        TableFilter::Ignore(tables) => {
            let (with_schema, bare) = split_by_schema(tables);
            if !bare.is_empty() {
                predicates.push(format!("{} NOT IN ({})", name(), bare.join(", ")));
            }
            if !with_schema.is_empty() {
                predicates.push(format!(
                    "({} IS NULL OR {} NOT IN ({}))",
                    cols.schema,
                    qualified(),
                    with_schema.join(", ")
                ));
            }
        }
    }

    match options.schema_filter() {
        SchemaFilter::All => {}
        SchemaFilter::Include(schemas) => {
            predicates.push(format!("LOWER({}) IN ({})", cols.schema, literal_list(schemas)));
        }
        SchemaFilter::Exclude(schemas) => {
            predicates.push(format!(
                "({0} IS NULL OR LOWER({0}) NOT IN ({1}))",
                cols.schema,
                literal_list(schemas)
            ));
        }
    }

    predicates
}

/// Lowercased literals for qualified (`'schema.name'`) and bare (`'name'`) entries.
fn split_by_schema(tables: &[Table]) -> (Vec<String>, Vec<String>) {
    let mut with_schema = Vec::new();
    let mut bare = Vec::new();
    for table in tables {
        match table.schema() {
            Some(schema) => with_schema.push(quote_literal(&format!(
                "{}.{}",
                normalize_ident(schema),
                normalize_ident(table.name())
            ))),
            None => bare.push(quote_literal(&normalize_ident(table.name()))),
        }
    }
    (with_schema, bare)
}

fn literal_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| quote_literal(&normalize_ident(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Append `predicates` to a query that already has a `WHERE` clause.
pub(crate) fn push_predicates(sql: &mut String, predicates: &[String]) {
    for predicate in predicates {
        sql.push_str("\n  AND ");
        sql.push_str(predicate);
    }
}
