//! Catalog discovery, dialect adapters and deletion planning for Respawn Rust.
//!
//! `respawn-schema` is the **catalog layer**. It knows how each engine
//! describes its tables and foreign keys and how to turn a deletion plan into
//! SQL, but it never decides *when* anything runs; that is the job of the
//! `respawn` facade.
//!
//! - [`dialect`] renders discovery queries, delete/reseed scripts and temporal
//!   toggles for SQLite, PostgreSQL, MySQL and SQL Server.
//! - [`introspect`] runs discovery queries on a [`Connection`](respawn_core::Connection)
//!   and decodes their rows.
//! - [`graph`] orders tables so referencing rows are deleted before the rows
//!   they reference, tolerating cycles.

pub mod dialect;
pub mod graph;
pub mod introspect;

pub use dialect::{
    DialectAdapter, MySqlAdapter, PostgresAdapter, SqlServerAdapter, SqliteAdapter, adapter_for,
};
pub use graph::{DeletionPlan, GraphBuilder};
pub use introspect::{
    Identity, discover_identities, discover_relationships, discover_tables,
    discover_temporal_tables, probe_temporal_support,
};
