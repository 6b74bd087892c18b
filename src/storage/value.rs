//! Value and Row types for EmberDB
//!
//! This module defines how data values are represented in memory.

use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A value in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value (64-bit)
    Integer(i64),
    /// Decimal value
    Decimal(f64),
    /// Date value (days since epoch)
    Date(i32),
    /// Text value
    Text(String),
}

/// Bit pattern used for equality and hashing. Negative zero folds into
/// zero so `-0.0` and `0.0` are the same key.
fn decimal_bits(d: f64) -> u64 {
    if d == 0.0 {
        0f64.to_bits()
    } else {
        d.to_bits()
    }
}

/// Exact comparison of an integer with a decimal. `None` for NaN.
fn cmp_int_decimal(i: i64, d: f64) -> Option<Ordering> {
    // 2^63, exactly representable
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    if d.is_nan() {
        return None;
    }
    if d >= BOUND {
        return Some(Ordering::Less);
    }
    if d < -BOUND {
        return Some(Ordering::Greater);
    }
    let floor = d.floor();
    match i.cmp(&(floor as i64)) {
        Ordering::Equal if d > floor => Some(Ordering::Less),
        ord => Some(ord),
    }
}

// Decimals compare by bits so that Value can be used as a hash key
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => decimal_bits(*a) == decimal_bits(*b),
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(v) => v.hash(state),
            Value::Integer(v) => v.hash(state),
            Value::Decimal(v) => decimal_bits(*v).hash(state),
            Value::Date(v) => v.hash(state),
            Value::Text(v) => v.hash(state),
        }
    }
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is an integer or a decimal
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Decimal(_))
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Exact numeric comparison of integers and decimals.
    ///
    /// Returns `None` when either side is not a number or is NaN.
    pub fn numeric_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Decimal(b)) => cmp_int_decimal(*a, *b),
            (Value::Decimal(a), Value::Integer(b)) => {
                cmp_int_decimal(*b, *a).map(Ordering::reverse)
            }
            _ => None,
        }
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to borrow as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOL",
            Value::Integer(_) => "INT",
            Value::Decimal(_) => "DECIMAL",
            Value::Date(_) => "DATE",
            Value::Text(_) => "VARCHAR",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Decimal(_) => 2,
            Value::Date(_) => 3,
            Value::Text(_) => 4,
        }
    }

    /// Total order used for index keys.
    ///
    /// NULL sorts first, then booleans, numbers, dates and text. Integers and
    /// decimals interleave by numeric value; an integer sorts before a decimal
    /// of the same magnitude so the order agrees with `Eq`.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => {
                f64::from_bits(decimal_bits(*a)).total_cmp(&f64::from_bits(decimal_bits(*b)))
            }
            (Value::Integer(a), Value::Decimal(b)) => cmp_int_decimal(*a, *b)
                .unwrap_or_else(|| (*a as f64).total_cmp(b))
                .then(Ordering::Less),
            (Value::Decimal(a), Value::Integer(b)) => cmp_int_decimal(*b, *a)
                .map(Ordering::reverse)
                .unwrap_or_else(|| a.total_cmp(&(*b as f64)))
                .then(Ordering::Greater),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(n) => write!(f, "{}", n),
            Value::Date(d) => write!(f, "DATE({})", d),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A row: column name to value, in insertion order.
///
/// Column names are matched case-insensitively. Serialized as a plain map.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Row {
    values: IndexMap<String, Value>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self {
            values: IndexMap::new(),
        }
    }

    /// Builder-style setter
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.values
            .get_index_of(column)
            .or_else(|| {
                self.values
                    .keys()
                    .position(|k| k.eq_ignore_ascii_case(column))
            })
    }

    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column)
            .and_then(|i| self.values.get_index(i))
            .map(|(_, v)| v)
    }

    /// Set a value, replacing any existing entry for the same column
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        match self.position(&column) {
            Some(i) => {
                if let Some((_, slot)) = self.values.get_index_mut(i) {
                    *slot = value.into();
                }
            }
            None => {
                self.values.insert(column, value.into());
            }
        }
    }

    /// Check whether the row carries a value for the column
    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column names in insertion order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate (column, value) pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(column, value)| other.get(column) == Some(value))
    }
}

// Duplicate columns, in any case, are rejected rather than merged
impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Row, A::Error> {
                let mut row = Row::new();
                while let Some((column, value)) = map.next_entry::<String, Value>()? {
                    if row.contains(&column) {
                        return Err(de::Error::custom(format!(
                            "duplicate column '{}'",
                            column
                        )));
                    }
                    row.values.insert(column, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}
