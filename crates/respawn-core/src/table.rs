//! Table identity.
//!
//! A `Table` is an optional schema plus a name. Two tables are equal when their
//! unquoted, ASCII-lowercased schema and name are equal, so `"dbo"."Foo"`,
//! `[dbo].[foo]` and `dbo.FOO` all name the same table. The same rule drives
//! hashing and ordering, which makes `Table` safe to use as a map or set key.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifiers::{normalize_ident, strip_quotes};

/// A table identified by an optional schema and a name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TableRepr")]
pub struct Table {
    schema: Option<String>,
    name: String,
}

/// Accepted serialized forms: `"name"`, `"schema.name"` or `{ schema, name }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TableRepr {
    Text(String),
    Parts {
        #[serde(default)]
        schema: Option<String>,
        name: String,
    },
}

impl TryFrom<TableRepr> for Table {
    type Error = Error;

    fn try_from(repr: TableRepr) -> Result<Self> {
        match repr {
            TableRepr::Text(text) => Table::parse(&text),
            TableRepr::Parts { schema, name } => {
                if name.trim().is_empty() {
                    return Err(Error::config("table", "table name must not be empty"));
                }
                Ok(match schema {
                    Some(schema) => Table::with_schema(schema, name),
                    None => Table::new(name),
                })
            }
        }
    }
}

fn qualified_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let segment = r#"(?:"[^"]+"|\[[^\]]+\]|`[^`]+`|[^.\s"\[\]`]+)"#;
        Regex::new(&format!(
            r"^\s*(?:(?P<schema>{segment})\.)?(?P<name>{segment})\s*$"
        ))
        .expect("qualified name pattern is valid")
    })
}

impl Table {
    /// A table without a schema qualifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// A schema-qualified table.
    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Parse `name` or `schema.name`; each segment may be quoted with `"`, `` ` `` or `[]`.
    ///
    /// Quote characters are removed from the stored parts.
    pub fn parse(text: &str) -> Result<Self> {
        let caps = qualified_name_regex().captures(text).ok_or_else(|| {
            Error::config("table", format!("`{text}` is not a valid table name"))
        })?;
        let name = strip_quotes(&caps["name"]).to_string();
        Ok(match caps.name("schema") {
            Some(schema) => Table::with_schema(strip_quotes(schema.as_str()), name),
            None => Table::new(name),
        })
    }

    /// The schema qualifier, if any.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `schema.name`, or `name` for unqualified tables.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Filter-entry matching: an unqualified entry matches `candidate` by name in
    /// any schema; a qualified entry needs both schema and name to match.
    pub fn matches(&self, candidate: &Table) -> bool {
        if normalize_ident(&self.name) != normalize_ident(&candidate.name) {
            return false;
        }
        match &self.schema {
            None => true,
            Some(schema) => candidate
                .schema
                .as_deref()
                .is_some_and(|s| normalize_ident(s) == normalize_ident(schema)),
        }
    }

    fn key(&self) -> (Option<String>, String) {
        (
            self.schema.as_deref().map(normalize_ident),
            normalize_ident(&self.name),
        )
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Table {}

impl Hash for Table {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Table {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Table {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl From<&str> for Table {
    fn from(name: &str) -> Self {
        Table::new(name)
    }
}

impl From<String> for Table {
    fn from(name: String) -> Self {
        Table::new(name)
    }
}
