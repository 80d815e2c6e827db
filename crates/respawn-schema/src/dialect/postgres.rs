//! PostgreSQL adapter.
//!
//! Reads `pg_catalog` directly rather than `information_schema`, which hides
//! constraints on tables the current role does not own. Partitions are skipped;
//! deleting from the partitioned parent empties them.

use respawn_core::{DbAdapter, IdentifierQuotes, RespawnerOptions};

use super::{CatalogColumns, DialectAdapter, filter_predicates, push_predicates};
use crate::graph::DeletionPlan;
use crate::introspect::Identity;

const SYSTEM_SCHEMAS: &str = "n.nspname NOT IN ('pg_catalog', 'information_schema')\n  \
     AND n.nspname NOT LIKE 'pg\\_toast%'\n  \
     AND n.nspname NOT LIKE 'pg\\_temp\\_%'";

/// Adapter for PostgreSQL.
pub struct PostgresAdapter;

impl DialectAdapter for PostgresAdapter {
    fn adapter(&self) -> DbAdapter {
        DbAdapter::Postgres
    }

    fn quotes(&self) -> IdentifierQuotes {
        IdentifierQuotes::DOUBLE
    }

    fn build_table_command_text(&self, options: &RespawnerOptions) -> String {
        let mut sql = format!(
            "SELECT n.nspname AS table_schema, c.relname AS table_name\n\
             FROM pg_catalog.pg_class AS c\n\
             JOIN pg_catalog.pg_namespace AS n ON n.oid = c.relnamespace\n\
             WHERE c.relkind IN ('r', 'p')\n  \
             AND NOT c.relispartition\n  \
             AND {SYSTEM_SCHEMAS}"
        );
        push_predicates(
            &mut sql,
            &filter_predicates(
                self,
                options,
                CatalogColumns {
                    schema: "n.nspname",
                    name: "c.relname",
                },
            ),
        );
        sql.push_str("\nORDER BY n.nspname, c.relname");
        tracing::debug!(dialect = "postgres", sql = %sql, "Built table discovery query");
        sql
    }

    fn build_relationship_command_text(&self, options: &RespawnerOptions) -> String {
        let mut sql = String::from(
            "SELECT pn.nspname AS parent_schema, pc.relname AS parent_table,\n       \
             rn.nspname AS referenced_schema, rc.relname AS referenced_table,\n       \
             con.conname AS constraint_name\n\
             FROM pg_catalog.pg_constraint AS con\n\
             JOIN pg_catalog.pg_class AS pc ON pc.oid = con.conrelid\n\
             JOIN pg_catalog.pg_namespace AS pn ON pn.oid = pc.relnamespace\n\
             JOIN pg_catalog.pg_class AS rc ON rc.oid = con.confrelid\n\
             JOIN pg_catalog.pg_namespace AS rn ON rn.oid = rc.relnamespace\n\
             WHERE con.contype = 'f'\n  \
             AND con.conparentid = 0",
        );
        let mut predicates = filter_predicates(
            self,
            options,
            CatalogColumns {
                schema: "pn.nspname",
                name: "pc.relname",
            },
        );
        predicates.extend(filter_predicates(
            self,
            options,
            CatalogColumns {
                schema: "rn.nspname",
                name: "rc.relname",
            },
        ));
        push_predicates(&mut sql, &predicates);
        sql.push_str("\nORDER BY pn.nspname, pc.relname, con.conname");
        tracing::debug!(dialect = "postgres", sql = %sql, "Built relationship discovery query");
        sql
    }

    fn suspend_constraints(&self, plan: &DeletionPlan) -> Vec<String> {
        plan.suspended_tables()
            .into_iter()
            .map(|t| format!("ALTER TABLE {} DISABLE TRIGGER ALL;", self.qualified_name(t)))
            .collect()
    }

    fn restore_constraints(&self, plan: &DeletionPlan) -> Vec<String> {
        plan.suspended_tables()
            .into_iter()
            .map(|t| format!("ALTER TABLE {} ENABLE TRIGGER ALL;", self.qualified_name(t)))
            .collect()
    }

    fn build_identity_command_text(&self, options: &RespawnerOptions) -> Option<String> {
        // Sequences owned by a column: serial ('a') or identity ('i').
        let mut sql = String::from(
            "SELECT n.nspname AS table_schema, c.relname AS table_name,\n       \
             sn.nspname AS sequence_schema, s.relname AS sequence_name\n\
             FROM pg_catalog.pg_class AS s\n\
             JOIN pg_catalog.pg_namespace AS sn ON sn.oid = s.relnamespace\n\
             JOIN pg_catalog.pg_depend AS d ON d.objid = s.oid\n \
             AND d.classid = 'pg_catalog.pg_class'::regclass\n \
             AND d.refclassid = 'pg_catalog.pg_class'::regclass\n \
             AND d.deptype IN ('a', 'i')\n\
             JOIN pg_catalog.pg_class AS c ON c.oid = d.refobjid\n\
             JOIN pg_catalog.pg_namespace AS n ON n.oid = c.relnamespace\n\
             WHERE s.relkind = 'S'",
        );
        push_predicates(
            &mut sql,
            &filter_predicates(
                self,
                options,
                CatalogColumns {
                    schema: "n.nspname",
                    name: "c.relname",
                },
            ),
        );
        sql.push_str("\nORDER BY n.nspname, c.relname, s.relname");
        Some(sql)
    }

    fn build_reseed_command_text(&self, identities: &[Identity]) -> String {
        let mut script = String::new();
        for sequence in identities.iter().filter_map(|i| i.sequence.as_ref()) {
            script.push_str(&format!(
                "ALTER SEQUENCE {} RESTART;\n",
                self.qualified_name(sequence)
            ));
        }
        tracing::debug!(dialect = "postgres", identities = identities.len(), "Rendered reseed script");
        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use respawn_core::{Relationship, Table};

    fn t(name: &str) -> Table {
        Table::with_schema("public", name)
    }

    fn options() -> respawn_core::RespawnerOptionsBuilder {
        RespawnerOptions::builder().db_adapter(DbAdapter::Postgres)
    }

    #[test]
    fn test_table_query_excludes_system_schemas() {
        let sql = PostgresAdapter.build_table_command_text(&options().build().unwrap());
        assert!(sql.contains("c.relkind IN ('r', 'p')"));
        assert!(sql.contains("NOT c.relispartition"));
        assert!(sql.contains("n.nspname NOT IN ('pg_catalog', 'information_schema')"));
    }

    #[test]
    fn test_table_query_schema_exclude() {
        let opts = options()
            .schemas_to_include(["public"])
            .schemas_to_exclude(["audit"])
            .build()
            .unwrap();
        let sql = PostgresAdapter.build_table_command_text(&opts);
        assert!(sql.contains("AND (n.nspname IS NULL OR LOWER(n.nspname) NOT IN ('audit'))"));
        assert!(!sql.contains("LOWER(n.nspname) IN ('public')"));
    }

    #[test]
    fn test_relationship_query_qualified_ignore() {
        let opts = options()
            .tables_to_ignore([Table::with_schema("public", "Migrations")])
            .build()
            .unwrap();
        let sql = PostgresAdapter.build_relationship_command_text(&opts);
        assert!(sql.contains("LOWER(pn.nspname || '.' || pc.relname) NOT IN ('public.migrations')"));
        assert!(sql.contains("LOWER(rn.nspname || '.' || rc.relname) NOT IN ('public.migrations')"));
    }

    #[test]
    fn test_delete_script_disables_triggers_on_cycles_only() {
        let opts = options().build().unwrap();
        let plan = GraphBuilder::new(
            [t("parent"), t("child"), t("leaf")],
            [
                Relationship::new(t("parent"), t("child"), "parent_child_fk"),
                Relationship::new(t("child"), t("parent"), "child_parent_fk"),
            ],
        )
        .plan();

        assert_eq!(
            PostgresAdapter.build_delete_command_text(&plan, &opts),
            "ALTER TABLE \"public\".\"child\" DISABLE TRIGGER ALL;\n\
             ALTER TABLE \"public\".\"parent\" DISABLE TRIGGER ALL;\n\
             DELETE FROM \"public\".\"leaf\";\n\
             DELETE FROM \"public\".\"child\";\n\
             DELETE FROM \"public\".\"parent\";\n\
             ALTER TABLE \"public\".\"child\" ENABLE TRIGGER ALL;\n\
             ALTER TABLE \"public\".\"parent\" ENABLE TRIGGER ALL;\n"
        );
        assert_eq!(
            PostgresAdapter.build_restore_command_text(&plan),
            "ALTER TABLE \"public\".\"child\" ENABLE TRIGGER ALL;\n\
             ALTER TABLE \"public\".\"parent\" ENABLE TRIGGER ALL;\n"
        );
    }

    #[test]
    fn test_acyclic_delete_script_has_no_suspension() {
        let opts = options().build().unwrap();
        let plan = GraphBuilder::new([t("a")], []).plan();
        assert_eq!(
            PostgresAdapter.build_delete_command_text(&plan, &opts),
            "DELETE FROM \"public\".\"a\";\n"
        );
        assert!(PostgresAdapter.build_restore_command_text(&plan).is_empty());
    }

    #[test]
    fn test_reseed_restarts_sequences() {
        let identities = vec![
            Identity::sequence(t("users"), t("users_id_seq")),
            Identity::table(t("no_sequence")),
        ];
        assert_eq!(
            PostgresAdapter.build_reseed_command_text(&identities),
            "ALTER SEQUENCE \"public\".\"users_id_seq\" RESTART;\n"
        );
    }
}
