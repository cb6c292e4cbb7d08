//! Runtime values produced while evaluating a condition.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{ConditionError, Result};

/// A condition value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
    /// Attribute values and list literals.
    Set(BTreeSet<String>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Set(_) => "set",
        }
    }

    pub(crate) fn into_bool(self, operation: &str) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(b),
            other => Err(mismatch(operation, "boolean", &other)),
        }
    }

    pub(crate) fn into_number(self, operation: &str) -> Result<f64> {
        match self {
            Self::Number(n) => Ok(n),
            other => Err(mismatch(operation, "number", &other)),
        }
    }

    /// Strings and numbers used where a string is expected.
    pub(crate) fn into_text(self, operation: &str) -> Result<String> {
        match self {
            Self::String(s) => Ok(s),
            Self::Number(n) => Ok(format_number(n)),
            other => Err(mismatch(operation, "string", &other)),
        }
    }

    /// Sets, with a single string treated as a one-element set.
    pub(crate) fn into_set(self, operation: &str) -> Result<BTreeSet<String>> {
        match self {
            Self::Set(set) => Ok(set),
            Self::String(s) => Ok(BTreeSet::from([s])),
            other => Err(mismatch(operation, "set", &other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Set(set) => {
                f.write_str("[")?;
                for (i, item) in set.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item:?}")?;
                }
                f.write_str("]")
            }
        }
    }
}

pub(crate) fn mismatch(operation: &str, expected: &'static str, found: &Value) -> ConditionError {
    ConditionError::TypeMismatch {
        operation: operation.to_string(),
        expected,
        found: found.type_name(),
    }
}

/// Renders integral numbers without a fractional part.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
