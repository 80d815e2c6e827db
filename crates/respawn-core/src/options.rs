//! Respawner configuration.
//!
//! `RespawnerOptions` is an immutable value produced by
//! [`RespawnerOptionsBuilder::build`], which validates the combination of
//! filters once so the adapters and the planner can trust it.
//!
//! # Filter resolution
//!
//! - A non-empty `tables_to_include` selects exactly those tables; `tables_to_ignore`
//!   is then not consulted.
//! - Otherwise every table is a candidate except those in `tables_to_ignore`.
//! - Unqualified entries match by name in every schema; qualified entries need
//!   the schema to match too.
//! - `schemas_to_exclude` wins over `schemas_to_include` when both are given.
//!
//! # Example
//!
//! ```ignore
//! let options = RespawnerOptions::builder()
//!     .db_adapter(DbAdapter::Postgres)
//!     .tables_to_ignore(["__diesel_schema_migrations"])
//!     .schemas_to_exclude(["audit"])
//!     .with_reseed(true)
//!     .build()?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifiers::normalize_ident;
use crate::table::Table;

/// The SQL dialect a checkpoint targets. Selected explicitly, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbAdapter {
    SqlServer,
    Postgres,
    MySql,
    Sqlite,
}

impl DbAdapter {
    /// Every supported engine.
    pub const ALL: [DbAdapter; 4] = [
        DbAdapter::SqlServer,
        DbAdapter::Postgres,
        DbAdapter::MySql,
        DbAdapter::Sqlite,
    ];

    /// Short lowercase name, as used in logs and configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            DbAdapter::SqlServer => "sqlserver",
            DbAdapter::Postgres => "postgres",
            DbAdapter::MySql => "mysql",
            DbAdapter::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DbAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replaces the default `DELETE FROM <table>;` statement for a table.
pub type DeleteStatementFormatter = Arc<dyn Fn(&Table) -> String + Send + Sync>;

/// Table-level filter after precedence has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFilter<'a> {
    /// No table filtering.
    All,
    /// Only these tables.
    Include(&'a [Table]),
    /// Everything except these tables.
    Ignore(&'a [Table]),
}

/// Schema-level filter after precedence has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFilter<'a> {
    /// No schema filtering.
    All,
    /// Only tables in these schemas.
    Include(&'a [String]),
    /// Tables outside these schemas.
    Exclude(&'a [String]),
}

/// Validated, immutable respawner configuration.
#[derive(Clone)]
pub struct RespawnerOptions {
    tables_to_include: Vec<Table>,
    tables_to_ignore: Vec<Table>,
    schemas_to_include: Vec<String>,
    schemas_to_exclude: Vec<String>,
    db_adapter: DbAdapter,
    with_reseed: bool,
    check_temporal_tables: bool,
    format_delete_statement: Option<DeleteStatementFormatter>,
}

impl fmt::Debug for RespawnerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RespawnerOptions")
            .field("tables_to_include", &self.tables_to_include)
            .field("tables_to_ignore", &self.tables_to_ignore)
            .field("schemas_to_include", &self.schemas_to_include)
            .field("schemas_to_exclude", &self.schemas_to_exclude)
            .field("db_adapter", &self.db_adapter)
            .field("with_reseed", &self.with_reseed)
            .field("check_temporal_tables", &self.check_temporal_tables)
            .field(
                "format_delete_statement",
                &self.format_delete_statement.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}

impl RespawnerOptions {
    /// Start building options.
    #[must_use]
    pub fn builder() -> RespawnerOptionsBuilder {
        RespawnerOptionsBuilder::new()
    }

    /// Options for `adapter` with no filtering and no optional features.
    pub fn for_adapter(adapter: DbAdapter) -> Self {
        Self {
            tables_to_include: Vec::new(),
            tables_to_ignore: Vec::new(),
            schemas_to_include: Vec::new(),
            schemas_to_exclude: Vec::new(),
            db_adapter: adapter,
            with_reseed: false,
            check_temporal_tables: false,
            format_delete_statement: None,
        }
    }

    /// Parse and validate options from JSON.
    ///
    /// ```json
    /// { "db_adapter": "sqlite", "tables_to_ignore": ["Foo", "main.Bar"], "with_reseed": true }
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let builder: RespawnerOptionsBuilder =
            serde_json::from_str(json).map_err(|e| Error::config("json", e.to_string()))?;
        builder.build()
    }

    /// A builder pre-filled with these options.
    pub fn to_builder(&self) -> RespawnerOptionsBuilder {
        RespawnerOptionsBuilder {
            tables_to_include: self.tables_to_include.clone(),
            tables_to_ignore: self.tables_to_ignore.clone(),
            schemas_to_include: self.schemas_to_include.clone(),
            schemas_to_exclude: self.schemas_to_exclude.clone(),
            db_adapter: Some(self.db_adapter),
            with_reseed: self.with_reseed,
            check_temporal_tables: self.check_temporal_tables,
            format_delete_statement: self.format_delete_statement.clone(),
        }
    }

    pub fn tables_to_include(&self) -> &[Table] {
        &self.tables_to_include
    }

    pub fn tables_to_ignore(&self) -> &[Table] {
        &self.tables_to_ignore
    }

    pub fn schemas_to_include(&self) -> &[String] {
        &self.schemas_to_include
    }

    pub fn schemas_to_exclude(&self) -> &[String] {
        &self.schemas_to_exclude
    }

    pub fn db_adapter(&self) -> DbAdapter {
        self.db_adapter
    }

    pub fn with_reseed(&self) -> bool {
        self.with_reseed
    }

    pub fn check_temporal_tables(&self) -> bool {
        self.check_temporal_tables
    }

    pub fn format_delete_statement(&self) -> Option<&DeleteStatementFormatter> {
        self.format_delete_statement.as_ref()
    }

    /// The table filter in effect.
    pub fn table_filter(&self) -> TableFilter<'_> {
        if !self.tables_to_include.is_empty() {
            TableFilter::Include(&self.tables_to_include)
        } else if !self.tables_to_ignore.is_empty() {
            TableFilter::Ignore(&self.tables_to_ignore)
        } else {
            TableFilter::All
        }
    }

    /// The schema filter in effect. Exclusion wins when both lists are set.
    pub fn schema_filter(&self) -> SchemaFilter<'_> {
        if !self.schemas_to_exclude.is_empty() {
            SchemaFilter::Exclude(&self.schemas_to_exclude)
        } else if !self.schemas_to_include.is_empty() {
            SchemaFilter::Include(&self.schemas_to_include)
        } else {
            SchemaFilter::All
        }
    }

    /// Whether a discovered table passes both filters.
    pub fn admits(&self, table: &Table) -> bool {
        let by_table = match self.table_filter() {
            TableFilter::All => true,
            TableFilter::Include(entries) => entries.iter().any(|e| e.matches(table)),
            TableFilter::Ignore(entries) => !entries.iter().any(|e| e.matches(table)),
        };
        if !by_table {
            return false;
        }

        let in_any = |schemas: &[String]| {
            table.schema().is_some_and(|s| {
                let s = normalize_ident(s);
                schemas.iter().any(|x| normalize_ident(x) == s)
            })
        };
        match self.schema_filter() {
            SchemaFilter::All => true,
            SchemaFilter::Include(schemas) => in_any(schemas),
            SchemaFilter::Exclude(schemas) => !in_any(schemas),
        }
    }
}

/// Builder for [`RespawnerOptions`].
///
/// Also the serde shape of a JSON options file; unknown keys are rejected.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RespawnerOptionsBuilder {
    tables_to_include: Vec<Table>,
    tables_to_ignore: Vec<Table>,
    schemas_to_include: Vec<String>,
    schemas_to_exclude: Vec<String>,
    db_adapter: Option<DbAdapter>,
    with_reseed: bool,
    check_temporal_tables: bool,
    #[serde(skip)]
    format_delete_statement: Option<DeleteStatementFormatter>,
}

impl fmt::Debug for RespawnerOptionsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RespawnerOptionsBuilder")
            .field("tables_to_include", &self.tables_to_include)
            .field("tables_to_ignore", &self.tables_to_ignore)
            .field("schemas_to_include", &self.schemas_to_include)
            .field("schemas_to_exclude", &self.schemas_to_exclude)
            .field("db_adapter", &self.db_adapter)
            .field("with_reseed", &self.with_reseed)
            .field("check_temporal_tables", &self.check_temporal_tables)
            .finish_non_exhaustive()
    }
}

impl RespawnerOptionsBuilder {
    /// Create an empty builder. An adapter must be set before `build()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the SQL dialect.
    pub fn db_adapter(mut self, adapter: DbAdapter) -> Self {
        self.db_adapter = Some(adapter);
        self
    }

    /// Only reset these tables.
    pub fn tables_to_include<I, T>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Table>,
    {
        self.tables_to_include.extend(tables.into_iter().map(Into::into));
        self
    }

    /// Never reset these tables.
    pub fn tables_to_ignore<I, T>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Table>,
    {
        self.tables_to_ignore.extend(tables.into_iter().map(Into::into));
        self
    }

    /// Only reset tables in these schemas.
    pub fn schemas_to_include<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas_to_include.extend(schemas.into_iter().map(Into::into));
        self
    }

    /// Never reset tables in these schemas.
    pub fn schemas_to_exclude<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas_to_exclude.extend(schemas.into_iter().map(Into::into));
        self
    }

    /// Reset identity/auto-increment counters after deleting.
    pub fn with_reseed(mut self, reseed: bool) -> Self {
        self.with_reseed = reseed;
        self
    }

    /// Turn system versioning off around the delete, where the engine has it.
    pub fn check_temporal_tables(mut self, check: bool) -> Self {
        self.check_temporal_tables = check;
        self
    }

    /// Render each table's delete statement with `f` instead of the default.
    pub fn format_delete_statement<F>(mut self, f: F) -> Self
    where
        F: Fn(&Table) -> String + Send + Sync + 'static,
    {
        self.format_delete_statement = Some(Arc::new(f));
        self
    }

    /// Validate and freeze the options.
    pub fn build(self) -> Result<RespawnerOptions> {
        let db_adapter = self.db_adapter.ok_or_else(|| {
            Error::config("db_adapter", "a database adapter must be selected explicitly")
        })?;

        let tables_to_include = validate_tables("tables_to_include", self.tables_to_include)?;
        let tables_to_ignore = validate_tables("tables_to_ignore", self.tables_to_ignore)?;
        let schemas_to_include = validate_schemas("schemas_to_include", self.schemas_to_include)?;
        let schemas_to_exclude = validate_schemas("schemas_to_exclude", self.schemas_to_exclude)?;

        if let Some(table) = tables_to_include
            .iter()
            .find(|t| tables_to_ignore.contains(t))
        {
            return Err(Error::config(
                "tables_to_ignore",
                format!("`{table}` is both included and ignored"),
            ));
        }

        if !schemas_to_include.is_empty() && !schemas_to_exclude.is_empty() {
            tracing::warn!(
                include = ?schemas_to_include,
                exclude = ?schemas_to_exclude,
                "Both schema filters set; schemas_to_exclude takes precedence"
            );
        }

        Ok(RespawnerOptions {
            tables_to_include,
            tables_to_ignore,
            schemas_to_include,
            schemas_to_exclude,
            db_adapter,
            with_reseed: self.with_reseed,
            check_temporal_tables: self.check_temporal_tables,
            format_delete_statement: self.format_delete_statement,
        })
    }
}

fn validate_tables(field: &'static str, tables: Vec<Table>) -> Result<Vec<Table>> {
    let mut out: Vec<Table> = Vec::with_capacity(tables.len());
    for table in tables {
        if normalize_ident(table.name()).is_empty()
            || table.schema().is_some_and(|s| normalize_ident(s).is_empty())
        {
            return Err(Error::config(
                field,
                format!("`{table}` has an empty schema or table name"),
            ));
        }
        if !out.contains(&table) {
            out.push(table);
        }
    }
    Ok(out)
}

fn validate_schemas(field: &'static str, schemas: Vec<String>) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(schemas.len());
    for schema in schemas {
        let key = normalize_ident(&schema);
        if key.is_empty() {
            return Err(Error::config(field, "schema names must not be empty"));
        }
        if !out.iter().any(|s| normalize_ident(s) == key) {
            out.push(schema);
        }
    }
    Ok(out)
}
