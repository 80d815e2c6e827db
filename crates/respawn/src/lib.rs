//! Respawn Rust: reset a database to a clean state between tests.
//!
//! `respawn` is the **facade crate**. It discovers the tables and foreign keys
//! of a database once, computes an order in which they can be emptied without
//! violating referential integrity (suspending constraints where cycles make
//! that impossible), and caches the resulting SQL in a [`Respawner`]
//! checkpoint that can be replayed before every test.
//!
//! # Quick start
//!
//! ```ignore
//! use respawn::prelude::*;
//! use respawn_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open("app.db")?;
//! let options = RespawnerOptions::builder()
//!     .db_adapter(DbAdapter::Sqlite)
//!     .tables_to_ignore(["schema_migrations"])
//!     .build()?;
//!
//! let respawner = match Respawner::create(&cx, &conn, options).await {
//!     Outcome::Ok(r) => r,
//!     Outcome::Err(e) => return Err(e),
//!     _ => unreachable!(),
//! };
//!
//! // before each test
//! respawner.reset(&cx, &conn).await;
//! ```
//!
//! # Crates
//!
//! - `respawn-core`: tables, options, errors and the `Connection` contract.
//! - `respawn-schema`: dialect adapters, discovery and the deletion planner.
//! - `respawn-sqlite`: a SQLite `Connection` (dev/test use).

pub mod respawner;

pub use respawn_core::{
    Connection, Cx, DbAdapter, DeleteStatementFormatter, Error, Outcome, Relationship,
    RespawnerOptions, RespawnerOptionsBuilder, Result, Row, SchemaFilter, Table, TableFilter,
    TemporalTable, Value,
};
pub use respawn_core::error;
pub use respawn_schema::{
    DeletionPlan, DialectAdapter, GraphBuilder, Identity, MySqlAdapter, PostgresAdapter,
    SqlServerAdapter, SqliteAdapter, adapter_for,
};
pub use respawner::{CheckpointReport, Respawner};

/// Everything needed to create and reset a checkpoint.
pub mod prelude {
    pub use crate::{
        Connection, Cx, DbAdapter, Error, Outcome, Respawner, RespawnerOptions, Table,
    };
}
