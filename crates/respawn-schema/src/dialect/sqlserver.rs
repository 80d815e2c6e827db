//! SQL Server adapter.
//!
//! The only engine here with system-versioned (temporal) tables. Support is
//! probed at checkpoint creation because it depends on the server version
//! (2016 / major version 13 and later).

use respawn_core::{
    DbAdapter, IdentifierQuotes, RespawnerOptions, Result, TemporalTable, quote_literal,
};

use super::{CatalogColumns, DialectAdapter, filter_predicates, push_predicates};
use crate::graph::DeletionPlan;
use crate::introspect::Identity;

const TABLE_COLUMNS: CatalogColumns<'static> = CatalogColumns {
    schema: "s.name",
    name: "t.name",
};

/// Adapter for Microsoft SQL Server.
pub struct SqlServerAdapter;

impl DialectAdapter for SqlServerAdapter {
    fn adapter(&self) -> DbAdapter {
        DbAdapter::SqlServer
    }

    fn quotes(&self) -> IdentifierQuotes {
        IdentifierQuotes::BRACKET
    }

    fn concat_qualified(&self, schema_expr: &str, name_expr: &str) -> String {
        format!("{schema_expr} + '.' + {name_expr}")
    }

    fn build_table_command_text(&self, options: &RespawnerOptions) -> String {
        let mut sql = String::from(
            "SELECT s.name AS table_schema, t.name AS table_name\n\
             FROM sys.tables AS t\n\
             INNER JOIN sys.schemas AS s ON s.schema_id = t.schema_id\n\
             WHERE t.is_ms_shipped = 0",
        );
        push_predicates(&mut sql, &filter_predicates(self, options, TABLE_COLUMNS));
        sql.push_str("\nORDER BY s.name, t.name");
        tracing::debug!(dialect = "sqlserver", sql = %sql, "Built table discovery query");
        sql
    }

    fn build_relationship_command_text(&self, options: &RespawnerOptions) -> String {
        let mut sql = String::from(
            "SELECT ps.name AS parent_schema, pt.name AS parent_table,\n       \
             rs.name AS referenced_schema, rt.name AS referenced_table,\n       \
             fk.name AS constraint_name\n\
             FROM sys.foreign_keys AS fk\n\
             INNER JOIN sys.tables AS pt ON pt.object_id = fk.parent_object_id\n\
             INNER JOIN sys.schemas AS ps ON ps.schema_id = pt.schema_id\n\
             INNER JOIN sys.tables AS rt ON rt.object_id = fk.referenced_object_id\n\
             INNER JOIN sys.schemas AS rs ON rs.schema_id = rt.schema_id\n\
             WHERE pt.is_ms_shipped = 0\n  \
             AND rt.is_ms_shipped = 0",
        );
        let mut predicates = filter_predicates(
            self,
            options,
            CatalogColumns {
                schema: "ps.name",
                name: "pt.name",
            },
        );
        predicates.extend(filter_predicates(
            self,
            options,
            CatalogColumns {
                schema: "rs.name",
                name: "rt.name",
            },
        ));
        push_predicates(&mut sql, &predicates);
        sql.push_str("\nORDER BY ps.name, pt.name, fk.name");
        tracing::debug!(dialect = "sqlserver", sql = %sql, "Built relationship discovery query");
        sql
    }

    fn suspend_constraints(&self, plan: &DeletionPlan) -> Vec<String> {
        plan.suspended_tables()
            .into_iter()
            .map(|t| format!("ALTER TABLE {} NOCHECK CONSTRAINT ALL;", self.qualified_name(t)))
            .collect()
    }

    fn restore_constraints(&self, plan: &DeletionPlan) -> Vec<String> {
        plan.suspended_tables()
            .into_iter()
            .map(|t| {
                format!(
                    "ALTER TABLE {} WITH CHECK CHECK CONSTRAINT ALL;",
                    self.qualified_name(t)
                )
            })
            .collect()
    }

    fn build_identity_command_text(&self, options: &RespawnerOptions) -> Option<String> {
        // Tables whose identity never issued a value must not be reseeded to 0,
        // or the next insert would start at 0 instead of the seed.
        let mut sql = String::from(
            "SELECT s.name AS table_schema, t.name AS table_name\n\
             FROM sys.identity_columns AS ic\n\
             INNER JOIN sys.tables AS t ON t.object_id = ic.object_id\n\
             INNER JOIN sys.schemas AS s ON s.schema_id = t.schema_id\n\
             WHERE t.is_ms_shipped = 0\n  \
             AND ic.last_value IS NOT NULL",
        );
        push_predicates(&mut sql, &filter_predicates(self, options, TABLE_COLUMNS));
        sql.push_str("\nORDER BY s.name, t.name");
        Some(sql)
    }

    fn build_reseed_command_text(&self, identities: &[Identity]) -> String {
        let mut script = String::new();
        for identity in identities {
            script.push_str(&format!(
                "DBCC CHECKIDENT ({}, RESEED, 0);\n",
                quote_literal(&self.qualified_name(&identity.table))
            ));
        }
        tracing::debug!(dialect = "sqlserver", identities = identities.len(), "Rendered reseed script");
        script
    }

    fn build_temporal_support_command_text(&self) -> Option<String> {
        Some(
            "SELECT CASE WHEN CAST(SERVERPROPERTY('ProductMajorVersion') AS INT) >= 13 \
             THEN 1 ELSE 0 END AS supports_temporal_tables"
                .to_string(),
        )
    }

    fn build_temporal_table_command_text(&self, options: &RespawnerOptions) -> Result<String> {
        let mut sql = String::from(
            "SELECT s.name AS table_schema, t.name AS table_name,\n       \
             hs.name AS history_schema, h.name AS history_table\n\
             FROM sys.tables AS t\n\
             INNER JOIN sys.schemas AS s ON s.schema_id = t.schema_id\n\
             INNER JOIN sys.tables AS h ON h.object_id = t.history_table_id\n\
             INNER JOIN sys.schemas AS hs ON hs.schema_id = h.schema_id\n\
             WHERE t.temporal_type = 2",
        );
        push_predicates(&mut sql, &filter_predicates(self, options, TABLE_COLUMNS));
        sql.push_str("\nORDER BY s.name, t.name");
        tracing::debug!(dialect = "sqlserver", sql = %sql, "Built temporal table discovery query");
        Ok(sql)
    }

    fn build_turn_off_system_versioning_command_text(
        &self,
        tables: &[TemporalTable],
    ) -> Result<String> {
        let mut script = String::new();
        for temporal in tables {
            script.push_str(&format!(
                "ALTER TABLE {} SET (SYSTEM_VERSIONING = OFF);\n",
                self.qualified_name(&temporal.table)
            ));
        }
        Ok(script)
    }

    fn build_turn_on_system_versioning_command_text(
        &self,
        tables: &[TemporalTable],
    ) -> Result<String> {
        let mut script = String::new();
        for temporal in tables {
            script.push_str(&format!(
                "ALTER TABLE {} SET (SYSTEM_VERSIONING = ON (HISTORY_TABLE = {}));\n",
                self.qualified_name(&temporal.table),
                self.qualified_name(&temporal.history_table)
            ));
        }
        Ok(script)
    }
}
