//! Foreign-key relationships and system-versioned tables found by discovery.

use serde::{Deserialize, Serialize};

use crate::table::Table;

/// A foreign key: rows of `parent_table` reference rows of `referenced_table`.
///
/// `parent_table` must be emptied before `referenced_table`, or the constraint
/// must be suspended while both are emptied. A relationship whose two ends are
/// the same table is a legal self-reference (hierarchies, linked lists).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    /// The referencing table (owner of the foreign key).
    pub parent_table: Table,

    /// The referenced table.
    pub referenced_table: Table,

    /// Constraint name. Informational only; engines without named foreign keys
    /// report a synthesized name.
    pub name: String,
}

impl Relationship {
    /// Create a relationship.
    pub fn new(parent_table: Table, referenced_table: Table, name: impl Into<String>) -> Self {
        Self {
            parent_table,
            referenced_table,
            name: name.into(),
        }
    }

    /// Whether the foreign key points back at its own table.
    pub fn is_self_referencing(&self) -> bool {
        self.parent_table == self.referenced_table
    }
}

/// A system-versioned (temporal) table and the history table it writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemporalTable {
    pub table: Table,
    pub history_table: Table,
}

impl TemporalTable {
    /// Create a temporal table description.
    pub fn new(table: Table, history_table: Table) -> Self {
        Self {
            table,
            history_table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_reference_detection() {
        let rel = Relationship::new(
            Table::with_schema("main", "Foo"),
            Table::with_schema("MAIN", "foo"),
            "fk_Foo_parent_id",
        );
        assert!(rel.is_self_referencing());

        let rel = Relationship::new(Table::new("Foo"), Table::new("Bob"), "FK_FOO_BOB");
        assert!(!rel.is_self_referencing());
    }

    #[test]
    fn test_parallel_edges_are_distinct() {
        let a = Relationship::new(Table::new("Order"), Table::new("Address"), "fk_billing");
        let b = Relationship::new(Table::new("Order"), Table::new("Address"), "fk_shipping");
        assert_ne!(a, b);
    }

    #[test]
    fn test_temporal_table_new() {
        let t = TemporalTable::new(
            Table::with_schema("dbo", "Account"),
            Table::with_schema("history", "AccountHistory"),
        );
        assert_eq!(t.table.name(), "Account");
        assert_eq!(t.history_table.schema(), Some("history"));
    }
}
