//! Dependency graph and deletion ordering.
//!
//! Tables are nodes, foreign keys are edges from the referencing table to the
//! referenced one. A table can be emptied once every *other* table that
//! references it is gone, so the plan is built by repeatedly peeling the tables
//! nobody references any more:
//!
//! ```text
//! Bar ──fk──▶ Foo ──fk──▶ Bob        plan: Bar, Foo, Bob
//! ```
//!
//! When a round finds nothing to peel, everything left is appended as one
//! cyclic group whose internal order is irrelevant; those tables (and any
//! self-referencing table) are flagged so the adapter suspends referential
//! integrity while they are emptied.
//!
//! The graph is index based: tables live in a sorted `Vec`, edges are index
//! pairs. Sorting up front makes every tie-break follow `Table` ordering.

use std::collections::{BTreeSet, HashMap};

use respawn_core::{Relationship, Table};
use serde::Serialize;

#[derive(Debug, Clone)]
struct Edge {
    parent: usize,
    referenced: usize,
    relationship: Relationship,
}

impl Edge {
    fn is_self_loop(&self) -> bool {
        self.parent == self.referenced
    }
}

/// Builds a [`DeletionPlan`] from discovered tables and relationships.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    tables: Vec<Table>,
    index: HashMap<Table, usize>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    /// Build the graph. Duplicate tables collapse into one node. Relationships
    /// with an end outside `tables` are dropped: a filtered-out table is
    /// treated as absent.
    pub fn new(
        tables: impl IntoIterator<Item = Table>,
        relationships: impl IntoIterator<Item = Relationship>,
    ) -> Self {
        let tables: Vec<Table> = tables
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: HashMap<Table, usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        let mut edges = Vec::new();
        for relationship in relationships {
            let parent = index.get(&relationship.parent_table).copied();
            let referenced = index.get(&relationship.referenced_table).copied();
            match (parent, referenced) {
                (Some(parent), Some(referenced)) => edges.push(Edge {
                    parent,
                    referenced,
                    relationship,
                }),
                _ => tracing::trace!(
                    relationship = %relationship.name,
                    parent = %relationship.parent_table,
                    referenced = %relationship.referenced_table,
                    "Dropping relationship to a table outside the plan"
                ),
            }
        }

        Self {
            tables,
            index,
            edges,
        }
    }

    /// Number of distinct tables in the graph.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Number of relationships kept after dropping orphans.
    pub fn relationship_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether `table` is a node of the graph.
    pub fn contains(&self, table: &Table) -> bool {
        self.index.contains_key(table)
    }

    /// Compute the deletion plan.
    pub fn plan(&self) -> DeletionPlan {
        let n = self.tables.len();

        // references[p] = distinct other tables p points at
        // remaining[t]  = distinct other tables still pointing at t
        let mut references: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut referenced_by: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut self_referencing = vec![false; n];
        for edge in &self.edges {
            if edge.is_self_loop() {
                self_referencing[edge.parent] = true;
            } else {
                references[edge.parent].insert(edge.referenced);
                referenced_by[edge.referenced].insert(edge.parent);
            }
        }
        let mut remaining: Vec<usize> = referenced_by.iter().map(BTreeSet::len).collect();
        let mut removed = vec![false; n];

        let mut ordered = Vec::with_capacity(n);
        loop {
            // Indices follow Table ordering, so the level is already sorted.
            let level: Vec<usize> = (0..n)
                .filter(|&i| !removed[i] && remaining[i] == 0)
                .collect();
            if level.is_empty() {
                break;
            }
            for &i in &level {
                removed[i] = true;
                for &target in &references[i] {
                    remaining[target] -= 1;
                }
            }
            ordered.extend(level);
        }

        let cyclic: Vec<usize> = (0..n).filter(|&i| !removed[i]).collect();
        let in_group: Vec<bool> = (0..n).map(|i| !removed[i]).collect();

        let cyclic_relationships: Vec<Relationship> = self
            .edges
            .iter()
            .filter(|e| e.is_self_loop() || (in_group[e.parent] && in_group[e.referenced]))
            .map(|e| e.relationship.clone())
            .collect();

        let self_refs: Vec<Table> = ordered
            .iter()
            .chain(&cyclic)
            .filter(|&&i| self_referencing[i])
            .map(|&i| self.tables[i].clone())
            .collect();

        let plan = DeletionPlan {
            ordered: ordered.iter().map(|&i| self.tables[i].clone()).collect(),
            cyclic_group: cyclic.iter().map(|&i| self.tables[i].clone()).collect(),
            self_referencing: self_refs,
            cyclic_relationships,
        };

        tracing::debug!(
            tables = n,
            relationships = self.edges.len(),
            ordered = plan.ordered.len(),
            cyclic = plan.cyclic_group.len(),
            self_referencing = plan.self_referencing.len(),
            "Computed deletion plan"
        );

        plan
    }
}

/// A safe order in which tables can be emptied.
///
/// `tables()` is `ordered()` followed by `cyclic_group()`. Every table appears
/// exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionPlan {
    ordered: Vec<Table>,
    cyclic_group: Vec<Table>,
    self_referencing: Vec<Table>,
    cyclic_relationships: Vec<Relationship>,
}

impl DeletionPlan {
    /// Every table in delete order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.ordered.iter().chain(&self.cyclic_group)
    }

    /// The part of the plan that is a strict topological order.
    pub fn ordered(&self) -> &[Table] {
        &self.ordered
    }

    /// Tables left over once peeling stalls. Sorted, but the order carries no meaning.
    pub fn cyclic_group(&self) -> &[Table] {
        &self.cyclic_group
    }

    /// Tables with a foreign key to themselves, in plan order.
    pub fn self_referencing(&self) -> &[Table] {
        &self.self_referencing
    }

    /// Relationships that keep the plan from being a total order: edges inside
    /// the cyclic group plus every self-reference.
    pub fn cyclic_relationships(&self) -> &[Relationship] {
        &self.cyclic_relationships
    }

    /// Tables whose constraints must be suspended during the delete, in plan order.
    pub fn suspended_tables(&self) -> Vec<&Table> {
        self.tables()
            .filter(|t| self.is_suspended(t))
            .collect()
    }

    /// Whether `table` is in the cyclic group or references itself.
    pub fn is_suspended(&self, table: &Table) -> bool {
        self.cyclic_group.contains(table) || self.self_referencing.contains(table)
    }

    /// Whether any table needs constraint suspension.
    pub fn requires_suspension(&self) -> bool {
        !self.cyclic_group.is_empty() || !self.self_referencing.is_empty()
    }

    /// Whether the relationship graph contains any cycle, self-loops included.
    pub fn has_cycles(&self) -> bool {
        !self.cyclic_relationships.is_empty()
    }

    /// Whether `table` is part of the plan.
    pub fn contains(&self, table: &Table) -> bool {
        self.tables().any(|t| t == table)
    }

    /// Position of `table` in delete order.
    pub fn position(&self, table: &Table) -> Option<usize> {
        self.tables().position(|t| t == table)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.ordered.len() + self.cyclic_group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
