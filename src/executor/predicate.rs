//! WHERE clause predicates
//!
//! A predicate is a single comparison `column OP literal`, where the column
//! may carry a `table.` qualifier and OP is one of `=`, `!=`, `>`, `<`, `>=`,
//! `<=`. Clauses that do not parse are treated as "no filter" by callers.

use std::cmp::Ordering;
use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, opt, rest, verify},
    sequence::{preceded, separated_pair},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::catalog::types::parse_bool;
use crate::storage::{Row, Value};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// Apply the operator to the result of comparing left against right
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed `column OP literal` comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Column name, without any table qualifier
    pub column: String,
    pub op: CompareOp,
    pub literal: Value,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: CompareOp, literal: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            literal: literal.into(),
        }
    }

    /// Parse a WHERE clause. Returns `None` when the clause is not a single
    /// comparison.
    pub fn parse(clause: &str) -> Option<Self> {
        let (_, (column, op, literal)) = comparison(clause).ok()?;
        Some(Self {
            column: column.to_string(),
            op,
            literal: parse_literal(literal),
        })
    }

    /// Evaluate against a row. A row without the column never matches.
    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column)
            .map_or(false, |value| compare(value, self.op, &self.literal))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.literal {
            Value::Text(s) => write!(f, "{} {} '{}'", self.column, self.op, s),
            other => write!(f, "{} {} {}", self.column, self.op, other),
        }
    }
}

/// Compare a stored value with a literal.
///
/// A NULL on the left only satisfies `!=` against a non-NULL literal. A NULL
/// literal only satisfies `!=`. Two numbers compare exactly, without a
/// round trip through `f64`; anything else compares as text, ignoring case.
pub fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    if left.is_null() {
        return op == CompareOp::NotEq && !right.is_null();
    }
    if right.is_null() {
        return op == CompareOp::NotEq;
    }

    if left.is_numeric() && right.is_numeric() {
        return left.numeric_cmp(right).map_or(false, |ord| op.holds(ord));
    }

    let a = left.to_string().to_uppercase();
    let b = right.to_string().to_uppercase();
    op.holds(a.cmp(&b))
}

/// Interpret literal text: surrounding quotes are stripped, empty text is
/// NULL, then integer, decimal and boolean forms are tried before falling
/// back to text.
pub fn parse_literal(text: &str) -> Value {
    let text = text.trim().trim_matches(|c| c == '\'' || c == '"');
    if text.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(d) = text.parse::<f64>() {
        if d.is_finite() {
            return Value::Decimal(d);
        }
    }
    if let Some(b) = parse_bool(text) {
        return Value::Boolean(b);
    }
    Value::Text(text.to_string())
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

/// `column` or `table.column`; yields the column
fn column_ref(input: &str) -> IResult<&str, &str> {
    let (input, first) = identifier(input)?;
    let (input, qualified) = opt(preceded(char('.'), identifier))(input)?;
    Ok((input, qualified.unwrap_or(first)))
}

/// Split `table.column`, where both parts are plain identifiers
pub(crate) fn qualified_column(input: &str) -> Option<(&str, &str)> {
    let parsed: IResult<&str, (&str, &str)> =
        all_consuming(separated_pair(identifier, char('.'), identifier))(input.trim());
    parsed.ok().map(|(_, pair)| pair)
}

fn operator(input: &str) -> IResult<&str, CompareOp> {
    // Two-character operators first
    alt((
        map(tag(">="), |_| CompareOp::GtEq),
        map(tag("<="), |_| CompareOp::LtEq),
        map(tag("!="), |_| CompareOp::NotEq),
        map(tag("<>"), |_| CompareOp::NotEq),
        map(tag("="), |_| CompareOp::Eq),
        map(tag(">"), |_| CompareOp::Gt),
        map(tag("<"), |_| CompareOp::Lt),
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, (&str, CompareOp, &str)> {
    let (input, _) = multispace0(input)?;
    let (input, column) = column_ref(input)?;
    let (input, _) = multispace0(input)?;
    let (input, op) = operator(input)?;
    let (input, _) = multispace0(input)?;
    let (input, literal) = verify(rest, |s: &str| !s.trim().is_empty())(input)?;
    Ok((input, (column, op, literal)))
}
