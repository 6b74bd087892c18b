//! Data types for EmberDB
//!
//! This module defines the column types supported by the database, the
//! validity predicate for each and the conversions allowed on write.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::Value;

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Integer
    Int,
    /// Variable-length text with an optional maximum length
    Varchar(Option<usize>),
    /// Boolean
    Bool,
    /// Decimal number
    Decimal,
    /// Date (days since epoch)
    Date,
}

impl DataType {
    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Decimal)
    }

    /// Check if this type is a text type
    pub fn is_text(&self) -> bool {
        matches!(self, DataType::Varchar(_))
    }

    /// Check whether a value satisfies this type as-is.
    ///
    /// NULL satisfies every type; nullability is enforced by constraints.
    pub fn is_valid(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (DataType::Int, Value::Integer(_)) => true,
            (DataType::Varchar(size), Value::Text(s)) => {
                size.map_or(true, |max| s.chars().count() <= max)
            }
            (DataType::Bool, Value::Boolean(_)) => true,
            (DataType::Decimal, Value::Decimal(_)) => true,
            (DataType::Date, Value::Date(_)) => true,
            _ => false,
        }
    }

    /// Convert a value to this type.
    ///
    /// Returns `None` when no safe conversion exists; callers turn that into
    /// a type error rather than substituting a default.
    pub fn convert(&self, value: &Value) -> Option<Value> {
        if self.is_valid(value) {
            return Some(value.clone());
        }

        let converted = match (self, value) {
            (DataType::Int, Value::Decimal(d)) => {
                let truncated = d.trunc();
                if truncated.is_finite()
                    && truncated >= i64::MIN as f64
                    && truncated <= i64::MAX as f64
                {
                    Some(Value::Integer(truncated as i64))
                } else {
                    None
                }
            }
            (DataType::Int, Value::Text(s)) => s.trim().parse::<i64>().ok().map(Value::Integer),
            (DataType::Int, Value::Boolean(b)) => Some(Value::Integer(i64::from(*b))),
            (DataType::Decimal, Value::Integer(i)) => Some(Value::Decimal(*i as f64)),
            (DataType::Decimal, Value::Text(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|d| d.is_finite())
                .map(Value::Decimal),
            (DataType::Varchar(_), other) => Some(Value::Text(other.to_string())),
            (DataType::Bool, Value::Integer(0)) => Some(Value::Boolean(false)),
            (DataType::Bool, Value::Integer(1)) => Some(Value::Boolean(true)),
            (DataType::Bool, Value::Text(s)) => parse_bool(s).map(Value::Boolean),
            _ => None,
        }?;

        // Text conversions must still honour the size bound
        self.is_valid(&converted).then_some(converted)
    }
}

/// Parse "true"/"false" case-insensitively
pub fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Varchar(Some(n)) => write!(f, "VARCHAR({})", n),
            DataType::Varchar(None) => write!(f, "VARCHAR"),
            DataType::Bool => write!(f, "BOOL"),
            DataType::Decimal => write!(f, "DECIMAL"),
            DataType::Date => write!(f, "DATE"),
        }
    }
}
