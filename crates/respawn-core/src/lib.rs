//! Core types and traits for Respawn Rust.
//!
//! `respawn-core` is the **foundation layer** for the workspace. It defines the
//! contracts and data types the planner, the dialect adapters and the drivers
//! all agree on.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: `Connection` is implemented by database drivers and is the
//!   only way the rest of the workspace talks to a live database.
//! - **Identity model**: `Table`, `Relationship` and `TemporalTable` describe what
//!   discovery found, with quoting- and case-insensitive equality.
//! - **Configuration**: `RespawnerOptions` is the validated, immutable option set and
//!   `DbAdapter` selects the SQL dialect.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync so every
//!   discovery and reset call is cancel-correct.
//!
//! # Who Uses This Crate
//!
//! - `respawn-schema` renders discovery and delete SQL from `RespawnerOptions` and
//!   decodes discovery `Row`s into `Table`/`Relationship` values.
//! - `respawn` composes both into a reusable checkpoint.
//! - Driver crates (`respawn-sqlite`) implement `Connection` and produce `Row`/`Value`.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod identifiers;
pub mod options;
pub mod relationship;
pub mod row;
pub mod table;
pub mod value;

pub use connection::Connection;
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, DiscoveryError, DiscoveryErrorKind,
    DiscoveryStage, Error, QueryError, QueryErrorKind, Result, UnsupportedError,
};
pub use identifiers::{IdentifierQuotes, quote_ident, quote_literal};
pub use options::{
    DbAdapter, DeleteStatementFormatter, RespawnerOptions, RespawnerOptionsBuilder, SchemaFilter,
    TableFilter,
};
pub use relationship::{Relationship, TemporalTable};
pub use row::{ColumnInfo, Row};
pub use table::Table;
pub use value::Value;
