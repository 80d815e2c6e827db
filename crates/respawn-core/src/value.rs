//! Values returned by drivers from catalog queries.

use serde::{Deserialize, Serialize};

/// A single column value.
///
/// Discovery only ever reads names, flags and counters, so the variant set is
/// the subset every engine can report losslessly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    BigInt(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Interpret the value as a flag: non-zero numbers, `true`, and the
    /// strings `"1"`/`"true"`/`"t"`/`"yes"` are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Bytes(_) => false,
            Value::Bool(b) => *b,
            Value::BigInt(v) => *v != 0,
            Value::Double(v) => *v != 0.0,
            Value::Text(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "t" | "yes"
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::BigInt(1).is_truthy());
        assert!(!Value::BigInt(0).is_truthy());
        assert!(Value::Text("TRUE".into()).is_truthy());
        assert!(!Value::Text("0".into()).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from("dbo"), Value::Text("dbo".into()));
        assert_eq!(Value::from(None::<&str>), Value::Null);
    }
}
