//! Error types for Respawn Rust.
//!
//! Failures fall into three families:
//!
//! - **Discovery** (`Error::Discovery`): a catalog query could not be executed or
//!   returned rows the planner cannot interpret. Raised while a checkpoint is being
//!   created; no checkpoint exists afterwards.
//! - **Unsupported** (`Error::Unsupported`): a feature the selected engine does not
//!   have. Callers normally check the capability first and skip the feature.
//! - **Execution** (`Error::Query` / `Error::Connection`): produced by the driver when
//!   a rendered script fails. Passed through unchanged.

use std::fmt;

use crate::options::DbAdapter;

/// Boxed error source carried by the structured error payloads.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// The error type shared by every crate in the workspace.
#[derive(Debug)]
pub enum Error {
    /// Connection-level failure reported by a driver.
    Connection(ConnectionError),
    /// A statement failed to execute.
    Query(QueryError),
    /// Table, relationship, identity or temporal discovery failed.
    Discovery(DiscoveryError),
    /// Invalid options.
    Config(ConfigError),
    /// Feature not available on the selected engine.
    Unsupported(UnsupportedError),
    /// Anything else.
    Custom(String),
}

/// Result alias for synchronous APIs.
pub type Result<T> = std::result::Result<T, Error>;

/// The broad category of a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Could not open the database.
    Connect,
    /// The connection exists but cannot be used (closed, poisoned lock, ...).
    Unavailable,
}

/// Connection-level failure.
#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<BoxedSource>,
}

/// The broad category of a statement failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The SQL text was rejected by the engine.
    Syntax,
    /// A constraint (foreign key, unique, check) was violated.
    Constraint,
    /// The engine refused the operation for lack of privileges.
    Permission,
    /// The database is locked or busy.
    Busy,
    /// Any other engine error.
    Database,
}

/// A statement failed to execute.
#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    /// The SQL that failed, when the driver knows it.
    pub sql: Option<String>,
    pub source: Option<BoxedSource>,
}

/// Which discovery step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStage {
    Tables,
    Relationships,
    Identities,
    TemporalSupport,
    TemporalTables,
}

impl DiscoveryStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            DiscoveryStage::Tables => "tables",
            DiscoveryStage::Relationships => "relationships",
            DiscoveryStage::Identities => "identities",
            DiscoveryStage::TemporalSupport => "temporal support",
            DiscoveryStage::TemporalTables => "temporal tables",
        }
    }
}

/// Why discovery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryErrorKind {
    /// The catalog query itself failed.
    QueryFailed,
    /// A returned row did not have the expected shape.
    MalformedRow,
    /// Nothing was left to reset after filtering.
    NoTables,
}

/// Table, relationship, identity or temporal discovery failed.
#[derive(Debug)]
pub struct DiscoveryError {
    pub stage: DiscoveryStage,
    pub kind: DiscoveryErrorKind,
    pub message: String,
    /// The catalog query that was running.
    pub sql: Option<String>,
    pub source: Option<Box<Error>>,
}

/// Invalid options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// The option at fault (e.g. `"tables_to_include"`).
    pub field: &'static str,
    pub message: String,
}

/// A feature the selected engine does not support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedError {
    pub adapter: DbAdapter,
    pub feature: &'static str,
}

impl Error {
    /// Build a configuration error.
    pub fn config(field: &'static str, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            field,
            message: message.into(),
        })
    }

    /// Build an unsupported-feature error.
    pub fn unsupported(adapter: DbAdapter, feature: &'static str) -> Self {
        Error::Unsupported(UnsupportedError { adapter, feature })
    }

    /// Build a malformed-row discovery error.
    pub fn malformed_row(stage: DiscoveryStage, message: impl Into<String>) -> Self {
        Error::Discovery(DiscoveryError {
            stage,
            kind: DiscoveryErrorKind::MalformedRow,
            message: message.into(),
            sql: None,
            source: None,
        })
    }

    /// Whether this is a capability-negative answer rather than a hard failure.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }

    /// Attach the failing catalog query to a discovery error.
    #[must_use]
    pub fn with_discovery_sql(self, sql: &str) -> Self {
        match self {
            Error::Discovery(mut e) => {
                e.sql.get_or_insert_with(|| sql.to_string());
                Error::Discovery(e)
            }
            other => other,
        }
    }

    /// Wrap a driver error raised while running a catalog query.
    pub fn discovery_failed(stage: DiscoveryStage, sql: &str, source: Error) -> Self {
        Error::Discovery(DiscoveryError {
            stage,
            kind: DiscoveryErrorKind::QueryFailed,
            message: format!("{} query failed: {}", stage.as_str(), source),
            sql: Some(sql.to_string()),
            source: Some(Box::new(source)),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Discovery(e) => {
                write!(f, "Discovery error ({}): {}", e.stage.as_str(), e.message)
            }
            Error::Config(e) => write!(f, "Invalid option `{}`: {}", e.field, e.message),
            Error::Unsupported(e) => write!(
                f,
                "{} is not supported by the {} adapter",
                e.feature,
                e.adapter.as_str()
            ),
            Error::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|s| s as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|s| s as &(dyn std::error::Error + 'static)),
            Error::Discovery(e) => e
                .source
                .as_deref()
                .map(|s| s as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}
