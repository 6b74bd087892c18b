//! Column constraints for EmberDB
//!
//! Every constraint is bound to one column and validated against a candidate
//! value plus the owning table's current rows.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::{RowId, Table, Value};

/// Resolves foreign-key parent tables during validation
pub trait ParentLookup {
    /// Check whether any row of `table` holds `value` in `column`
    fn parent_contains(&self, table: &str, column: &str, value: &Value) -> Result<bool>;
}

/// Lookup used when no repository is available; every parent is unresolved
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParentTables;

impl ParentLookup for NoParentTables {
    fn parent_contains(&self, table: &str, _column: &str, _value: &Value) -> Result<bool> {
        Err(Error::TableNotFound(table.to_string()))
    }
}

/// Caller-supplied predicate of a CHECK constraint
#[derive(Clone)]
pub struct CheckRule {
    /// Human-readable condition, e.g. `price > 0`
    pub description: String,
    predicate: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl CheckRule {
    /// Create a rule from a description and a predicate
    pub fn new(
        description: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Value must be a number greater than zero
    pub fn positive_number(column: &str) -> Self {
        Self::new(format!("{} > 0", column), |v| {
            v.as_f64().map_or(false, |n| n > 0.0)
        })
    }

    /// Value must be a non-empty string
    pub fn not_empty_string(column: &str) -> Self {
        Self::new(format!("{} != ''", column), |v| {
            v.as_str().map_or(false, |s| !s.is_empty())
        })
    }

    /// Evaluate the rule
    pub fn holds(&self, value: &Value) -> bool {
        (self.predicate)(value)
    }
}

impl fmt::Debug for CheckRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRule")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Constraint variants
#[derive(Debug, Clone)]
pub enum ConstraintKind {
    NotNull,
    Unique,
    PrimaryKey,
    Check(CheckRule),
    ForeignKey { table: String, column: String },
}

/// A constraint bound to one column
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Label used in violation messages, e.g. `PK_id`
    pub name: String,
    /// Column the constraint applies to
    pub column: String,
    /// Variant
    pub kind: ConstraintKind,
}

/// What a constraint sees while validating one value
pub struct ValidationContext<'a> {
    /// Table receiving the value
    pub table: &'a Table,
    /// Row being replaced (UPDATE); it does not count as a duplicate
    pub exclude: Option<RowId>,
    /// Resolver for foreign-key parents
    pub parents: &'a dyn ParentLookup,
}

impl Constraint {
    fn build(column: impl Into<String>, kind: ConstraintKind, prefix: &str) -> Self {
        let column = column.into();
        Self {
            name: format!("{}_{}", prefix, column),
            column,
            kind,
        }
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Self::build(column, ConstraintKind::NotNull, "NN")
    }

    pub fn unique(column: impl Into<String>) -> Self {
        Self::build(column, ConstraintKind::Unique, "UQ")
    }

    pub fn primary_key(column: impl Into<String>) -> Self {
        Self::build(column, ConstraintKind::PrimaryKey, "PK")
    }

    pub fn check(column: impl Into<String>, rule: CheckRule) -> Self {
        Self::build(column, ConstraintKind::Check(rule), "CK")
    }

    pub fn foreign_key(
        column: impl Into<String>,
        table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        let column = column.into();
        let table = table.into();
        let parent_column = parent_column.into();
        Self {
            name: format!("FK_{}_{}_{}", column, table, parent_column),
            column,
            kind: ConstraintKind::ForeignKey {
                table,
                column: parent_column,
            },
        }
    }

    /// Override the generated label
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Check whether this constraint is bound to the column, ignoring case
    pub fn applies_to(&self, column: &str) -> bool {
        self.column.eq_ignore_ascii_case(column)
    }

    /// Check whether this is a PRIMARY KEY or UNIQUE constraint
    pub fn is_uniqueness(&self) -> bool {
        matches!(self.kind, ConstraintKind::Unique | ConstraintKind::PrimaryKey)
    }

    /// Validate a candidate value.
    ///
    /// Returns `Ok(Some(message))` for a violation. `Err` is reserved for
    /// configuration problems such as an unresolvable foreign-key parent.
    pub fn validate(&self, value: &Value, ctx: &ValidationContext<'_>) -> Result<Option<String>> {
        let violation = match &self.kind {
            ConstraintKind::NotNull => value.is_null().then(|| {
                format!(
                    "column '{}' cannot be NULL (constraint {})",
                    self.column, self.name
                )
            }),
            ConstraintKind::Unique => {
                if !value.is_null() && ctx.table.column_contains(&self.column, value, ctx.exclude) {
                    Some(format!(
                        "duplicate value '{}' in unique column '{}' (constraint {})",
                        value, self.column, self.name
                    ))
                } else {
                    None
                }
            }
            ConstraintKind::PrimaryKey => {
                if value.is_null() {
                    Some(format!(
                        "primary key column '{}' cannot be NULL (constraint {})",
                        self.column, self.name
                    ))
                } else if ctx.table.column_contains(&self.column, value, ctx.exclude) {
                    Some(format!(
                        "duplicate primary key '{}' in column '{}' (constraint {})",
                        value, self.column, self.name
                    ))
                } else {
                    None
                }
            }
            ConstraintKind::Check(rule) => (!rule.holds(value)).then(|| {
                format!(
                    "check '{}' failed on column '{}' for value '{}' (constraint {})",
                    rule.description, self.column, value, self.name
                )
            }),
            ConstraintKind::ForeignKey { table, column } => {
                if value.is_null() {
                    None
                } else {
                    let found = if table == ctx.table.name() {
                        ctx.table.column_contains(column, value, None)
                    } else {
                        ctx.parents
                            .parent_contains(table, column, value)
                            .map_err(|_| Error::UnresolvedForeignKey(self.name.clone()))?
                    };
                    (!found).then(|| {
                        format!(
                            "value '{}' in column '{}' has no match in {}.{} (constraint {})",
                            value, self.column, table, column, self.name
                        )
                    })
                }
            }
        };
        Ok(violation)
    }
}
