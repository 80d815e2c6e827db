//! MySQL / MariaDB adapter.
//!
//! In MySQL a schema is a database. Unless `schemas_to_include` names the
//! databases explicitly, discovery is scoped to `DATABASE()` so a checkpoint
//! never reaches into other databases on the same server.

use respawn_core::{DbAdapter, IdentifierQuotes, RespawnerOptions, SchemaFilter};

use super::{CatalogColumns, DialectAdapter, filter_predicates, push_predicates};
use crate::graph::DeletionPlan;
use crate::introspect::Identity;

/// Adapter for MySQL and MariaDB.
pub struct MySqlAdapter;

impl MySqlAdapter {
    /// Predicate limiting `schema_col` to the current database when no include list is set.
    fn scope(options: &RespawnerOptions, schema_col: &str) -> Option<String> {
        match options.schema_filter() {
            SchemaFilter::Include(_) => None,
            SchemaFilter::All | SchemaFilter::Exclude(_) => Some(format!("{schema_col} = DATABASE()")),
        }
    }

    fn tables_query(&self, options: &RespawnerOptions, extra: &str) -> String {
        let mut sql = format!(
            "SELECT t.TABLE_SCHEMA AS table_schema, t.TABLE_NAME AS table_name\n\
             FROM information_schema.TABLES AS t\n\
             WHERE t.TABLE_TYPE = 'BASE TABLE'\n  \
             AND t.TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys'){extra}"
        );
        let mut predicates: Vec<String> = Self::scope(options, "t.TABLE_SCHEMA").into_iter().collect();
        predicates.extend(filter_predicates(
            self,
            options,
            CatalogColumns {
                schema: "t.TABLE_SCHEMA",
                name: "t.TABLE_NAME",
            },
        ));
        push_predicates(&mut sql, &predicates);
        sql.push_str("\nORDER BY t.TABLE_SCHEMA, t.TABLE_NAME");
        sql
    }
}

impl DialectAdapter for MySqlAdapter {
    fn adapter(&self) -> DbAdapter {
        DbAdapter::MySql
    }

    fn quotes(&self) -> IdentifierQuotes {
        IdentifierQuotes::BACKTICK
    }

    fn concat_qualified(&self, schema_expr: &str, name_expr: &str) -> String {
        format!("CONCAT({schema_expr}, '.', {name_expr})")
    }

    fn build_table_command_text(&self, options: &RespawnerOptions) -> String {
        let sql = self.tables_query(options, "");
        tracing::debug!(dialect = "mysql", sql = %sql, "Built table discovery query");
        sql
    }

    fn build_relationship_command_text(&self, options: &RespawnerOptions) -> String {
        let mut sql = String::from(
            "SELECT rc.CONSTRAINT_SCHEMA AS parent_schema, rc.TABLE_NAME AS parent_table,\n       \
             rc.UNIQUE_CONSTRAINT_SCHEMA AS referenced_schema, rc.REFERENCED_TABLE_NAME AS referenced_table,\n       \
             rc.CONSTRAINT_NAME AS constraint_name\n\
             FROM information_schema.REFERENTIAL_CONSTRAINTS AS rc\n\
             WHERE 1 = 1",
        );
        let mut predicates: Vec<String> =
            Self::scope(options, "rc.CONSTRAINT_SCHEMA").into_iter().collect();
        predicates.extend(filter_predicates(
            self,
            options,
            CatalogColumns {
                schema: "rc.CONSTRAINT_SCHEMA",
                name: "rc.TABLE_NAME",
            },
        ));
        predicates.extend(filter_predicates(
            self,
            options,
            CatalogColumns {
                schema: "rc.UNIQUE_CONSTRAINT_SCHEMA",
                name: "rc.REFERENCED_TABLE_NAME",
            },
        ));
        push_predicates(&mut sql, &predicates);
        sql.push_str("\nORDER BY rc.CONSTRAINT_SCHEMA, rc.TABLE_NAME, rc.CONSTRAINT_NAME");
        tracing::debug!(dialect = "mysql", sql = %sql, "Built relationship discovery query");
        sql
    }

    fn suspend_constraints(&self, _plan: &DeletionPlan) -> Vec<String> {
        vec!["SET FOREIGN_KEY_CHECKS = 0;".to_string()]
    }

    fn restore_constraints(&self, _plan: &DeletionPlan) -> Vec<String> {
        vec!["SET FOREIGN_KEY_CHECKS = 1;".to_string()]
    }

    fn build_identity_command_text(&self, options: &RespawnerOptions) -> Option<String> {
        Some(self.tables_query(options, "\n  AND t.AUTO_INCREMENT IS NOT NULL"))
    }

    fn build_reseed_command_text(&self, identities: &[Identity]) -> String {
        let mut script = String::new();
        for identity in identities {
            script.push_str(&format!(
                "ALTER TABLE {} AUTO_INCREMENT = 1;\n",
                self.qualified_name(&identity.table)
            ));
        }
        tracing::debug!(dialect = "mysql", identities = identities.len(), "Rendered reseed script");
        script
    }
}
