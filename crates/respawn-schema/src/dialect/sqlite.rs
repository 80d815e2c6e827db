//! SQLite adapter.
//!
//! Discovery reads `pragma_table_list` and `pragma_foreign_key_list` (SQLite
//! 3.37+), so attached databases show up as schemas. SQLite foreign keys have
//! no names; one is synthesized as `fk_<table>_<first column>`. Enforcement is
//! toggled with `PRAGMA foreign_keys`, which only takes effect outside a
//! transaction.

use std::collections::BTreeMap;

use respawn_core::{DbAdapter, IdentifierQuotes, RespawnerOptions, quote_literal};
use respawn_core::identifiers::normalize_ident;

use super::{CatalogColumns, DialectAdapter, filter_predicates, push_predicates};
use crate::graph::DeletionPlan;
use crate::introspect::Identity;

/// User tables only: internal `sqlite_*` tables and the per-connection `temp` schema are skipped.
const USER_TABLES: &str = "t.type = 'table'\n  AND t.name NOT LIKE 'sqlite\\_%' ESCAPE '\\'\n  AND t.schema <> 'temp'";

const TABLE_COLUMNS: CatalogColumns<'static> = CatalogColumns {
    schema: "t.schema",
    name: "t.name",
};

/// Adapter for SQLite.
pub struct SqliteAdapter;

impl DialectAdapter for SqliteAdapter {
    fn adapter(&self) -> DbAdapter {
        DbAdapter::Sqlite
    }

    fn quotes(&self) -> IdentifierQuotes {
        IdentifierQuotes::DOUBLE
    }

    fn build_table_command_text(&self, options: &RespawnerOptions) -> String {
        let mut sql = format!(
            "SELECT t.schema AS table_schema, t.name AS table_name\n\
             FROM pragma_table_list AS t\n\
             WHERE {USER_TABLES}"
        );
        push_predicates(&mut sql, &filter_predicates(self, options, TABLE_COLUMNS));
        sql.push_str("\nORDER BY t.schema, t.name");
        tracing::debug!(dialect = "sqlite", sql = %sql, "Built table discovery query");
        sql
    }

    fn build_relationship_command_text(&self, options: &RespawnerOptions) -> String {
        let mut sql = format!(
            "SELECT t.schema AS parent_schema, t.name AS parent_table,\n\
             \x20      t.schema AS referenced_schema, fk.\"table\" AS referenced_table,\n\
             \x20      'fk_' || t.name || '_' || fk.\"from\" AS constraint_name\n\
             FROM pragma_table_list AS t, pragma_foreign_key_list(t.name, t.schema) AS fk\n\
             WHERE {USER_TABLES}\n\
             \x20 AND fk.seq = 0"
        );
        let mut predicates = filter_predicates(self, options, TABLE_COLUMNS);
        predicates.extend(filter_predicates(
            self,
            options,
            CatalogColumns {
                schema: "t.schema",
                name: "fk.\"table\"",
            },
        ));
        push_predicates(&mut sql, &predicates);
        sql.push_str("\nORDER BY t.schema, t.name, fk.id");
        tracing::debug!(dialect = "sqlite", sql = %sql, "Built relationship discovery query");
        sql
    }

    fn suspend_constraints(&self, _plan: &DeletionPlan) -> Vec<String> {
        vec!["PRAGMA foreign_keys = OFF;".to_string()]
    }

    fn restore_constraints(&self, _plan: &DeletionPlan) -> Vec<String> {
        vec!["PRAGMA foreign_keys = ON;".to_string()]
    }

    fn build_identity_command_text(&self, options: &RespawnerOptions) -> Option<String> {
        // AUTOINCREMENT counters live in a per-schema sqlite_sequence table that
        // only exists once such a table has been created.
        let mut sql = format!(
            "SELECT t.schema AS table_schema, t.name AS table_name\n\
             FROM pragma_table_list AS t\n\
             WHERE {USER_TABLES}\n\
             \x20 AND EXISTS (SELECT 1 FROM pragma_table_list AS s\n\
             \x20             WHERE s.schema = t.schema AND s.name = 'sqlite_sequence')"
        );
        push_predicates(&mut sql, &filter_predicates(self, options, TABLE_COLUMNS));
        sql.push_str("\nORDER BY t.schema, t.name");
        Some(sql)
    }

    fn build_reseed_command_text(&self, identities: &[Identity]) -> String {
        let mut by_schema: BTreeMap<String, (String, Vec<String>)> = BTreeMap::new();
        for identity in identities {
            let schema = identity.table.schema().unwrap_or("main");
            by_schema
                .entry(normalize_ident(schema))
                .or_insert_with(|| (schema.to_string(), Vec::new()))
                .1
                .push(quote_literal(&normalize_ident(identity.table.name())));
        }

        let mut script = String::new();
        for (schema, names) in by_schema.values() {
            script.push_str(&format!(
                "DELETE FROM {}.\"sqlite_sequence\" WHERE LOWER(name) IN ({});\n",
                self.quote_identifier(schema),
                names.join(", ")
            ));
        }
        tracing::debug!(dialect = "sqlite", identities = identities.len(), "Rendered reseed script");
        script
    }
}
