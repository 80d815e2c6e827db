//! Result rows produced by drivers.

use std::sync::Arc;

use crate::value::Value;

/// Column names shared by every row of one result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    names: Vec<String>,
}

impl ColumnInfo {
    /// Create column metadata from ordered names.
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Column names in result order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of a column, compared case-insensitively.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the result set has no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One row of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<ColumnInfo>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row with its own column metadata.
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_columns(Arc::new(ColumnInfo::new(names)), values)
    }

    /// Create a row sharing column metadata with the rest of its result set.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// The column metadata.
    pub fn columns(&self) -> &ColumnInfo {
        &self.columns
    }

    /// Value by position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value by column name (case-insensitive).
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over values in column order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}
