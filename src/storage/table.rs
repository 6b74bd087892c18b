//! Table storage for EmberDB
//!
//! A table owns its columns, its rows and its constraints, and keeps the
//! indexes created on it in step with every row mutation.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::index::{IndexHandle, IndexKey};
use super::value::{Row, Value};
use crate::catalog::{
    Column, ColumnDef, Constraint, ConstraintKind, NoParentTables, ParentLookup,
    ValidationContext,
};
use crate::error::{Error, Result};

/// Shared handle to a table, as stored in the repository
pub type TableHandle = Arc<RwLock<Table>>;

/// Identity of a row within its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An in-memory table
#[derive(Debug)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    rows: IndexMap<RowId, Row>,
    constraints: Vec<Constraint>,
    indexes: Vec<IndexHandle>,
    next_row_id: u64,
}

impl Table {
    /// Create an empty table with no columns
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: IndexMap::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
            next_row_id: 1,
        }
    }

    /// Create a table from column definitions.
    ///
    /// Non-nullable columns get a NOT NULL constraint, primary keys a
    /// PRIMARY KEY constraint and unique columns a UNIQUE constraint.
    pub fn from_defs(name: impl Into<String>, defs: &[ColumnDef]) -> Result<Self> {
        let mut table = Self::new(name);
        for def in defs {
            table.add_column(def.to_column())?;
        }
        for def in defs {
            if def.primary_key {
                table.add_constraint(Constraint::primary_key(&def.name))?;
            } else if !def.nullable {
                table.add_constraint(Constraint::not_null(&def.name))?;
            }
            if def.unique && !def.primary_key {
                table.add_constraint(Constraint::unique(&def.name))?;
            }
        }
        Ok(table)
    }

    /// Get table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in schema order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get column by name, ignoring case
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_named(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Add a column. Existing rows receive the column default (or NULL).
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(Error::ColumnAlreadyExists(
                column.name.clone(),
                self.name.clone(),
            ));
        }
        let fill = column.default.clone().unwrap_or(Value::Null);
        for row in self.rows.values_mut() {
            row.set(column.name.clone(), fill.clone());
        }
        self.columns.push(column);
        Ok(())
    }

    /// Attach a constraint to an existing column
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<()> {
        if !self.has_column(&constraint.column) {
            return Err(Error::ColumnNotFound(
                constraint.column.clone(),
                self.name.clone(),
            ));
        }
        self.constraints.push(constraint);
        Ok(())
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Tables referenced by this table's foreign keys, excluding itself
    pub fn foreign_key_parents(&self) -> impl Iterator<Item = &str> {
        self.constraints.iter().filter_map(move |c| match &c.kind {
            ConstraintKind::ForeignKey { table, .. } if table != &self.name => {
                Some(table.as_str())
            }
            _ => None,
        })
    }

    /// Columns carrying a PRIMARY KEY or UNIQUE constraint
    pub fn unique_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for c in self.constraints.iter().filter(|c| c.is_uniqueness()) {
            if !columns.iter().any(|n| n.eq_ignore_ascii_case(&c.column)) {
                columns.push(&c.column);
            }
        }
        columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows in insertion order
    pub fn rows(&self) -> impl Iterator<Item = (RowId, &Row)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.get(&id)
    }

    /// Resolve row ids, skipping ids no longer present
    pub fn rows_by_ids(&self, ids: &[RowId]) -> Vec<Row> {
        ids.iter().filter_map(|id| self.rows.get(id).cloned()).collect()
    }

    /// First row whose full value mapping equals `row`
    pub fn find_row(&self, row: &Row) -> Option<RowId> {
        self.rows
            .iter()
            .find(|(_, candidate)| *candidate == row)
            .map(|(id, _)| *id)
    }

    /// Check whether a row other than `exclude` holds `value` in `column`
    pub fn column_contains(&self, column: &str, value: &Value, exclude: Option<RowId>) -> bool {
        if let Some(index) = self.index_on(column) {
            let ids = index.read().search(&IndexKey::new(value.clone()));
            return ids.iter().any(|id| Some(*id) != exclude);
        }
        self.rows
            .iter()
            .any(|(id, row)| Some(*id) != exclude && row.get(column) == Some(value))
    }

    /// Check a row against the schema and convert its values to the column
    /// types. The result carries one value per column, in schema order.
    pub fn normalize(&self, row: &Row) -> Result<Row> {
        if row.len() != self.columns.len() {
            return Err(Error::ColumnCountMismatch {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        if let Some(unknown) = row.columns().find(|c| !self.has_column(c)) {
            return Err(Error::ColumnNotFound(unknown.to_string(), self.name.clone()));
        }

        let mut normalized = Row::new();
        for column in &self.columns {
            let value = row
                .get(&column.name)
                .ok_or_else(|| Error::MissingValue(column.name.clone(), self.name.clone()))?;
            let converted =
                column
                    .data_type
                    .convert(value)
                    .ok_or_else(|| Error::InvalidDataType {
                        column: column.name.clone(),
                        expected: column.data_type.to_string(),
                        found: value.type_name().to_string(),
                    })?;
            normalized.set(column.name.clone(), converted);
        }
        Ok(normalized)
    }

    /// Evaluate every constraint against a normalized row, collecting all
    /// violations
    pub fn validate(
        &self,
        row: &Row,
        exclude: Option<RowId>,
        parents: &dyn ParentLookup,
    ) -> Result<()> {
        let ctx = ValidationContext {
            table: self,
            exclude,
            parents,
        };
        let mut violations = Vec::new();
        for column in &self.columns {
            let value = row.get(&column.name).unwrap_or(&Value::Null);
            for constraint in self.constraints.iter().filter(|c| c.applies_to(&column.name)) {
                if let Some(message) = constraint.validate(value, &ctx)? {
                    violations.push(message);
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::ConstraintViolation(violations))
        }
    }

    /// Insert a row without foreign-key resolution
    pub fn add_row(&mut self, row: Row) -> Result<RowId> {
        self.add_row_with(row, &NoParentTables)
    }

    /// Validate and insert a row. Nothing is stored if any check fails.
    pub fn add_row_with(&mut self, row: Row, parents: &dyn ParentLookup) -> Result<RowId> {
        let row = self.normalize(&row)?;
        self.validate(&row, None, parents)?;

        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        for index in &self.indexes {
            let mut index = index.write();
            let key = index.key_for(&row);
            index.insert(key, id);
        }
        self.rows.insert(id, row);
        Ok(id)
    }

    /// Remove a row by identity
    pub fn remove_row(&mut self, id: RowId) -> Option<Row> {
        let row = self.rows.shift_remove(&id)?;
        for index in &self.indexes {
            let mut index = index.write();
            let key = index.key_for(&row);
            index.delete(&key, id);
        }
        Some(row)
    }

    /// Replace values of one row and re-validate it.
    ///
    /// Returns the row before and after the update.
    pub fn update_row(
        &mut self,
        id: RowId,
        changes: &Row,
        parents: &dyn ParentLookup,
    ) -> Result<(Row, Row)> {
        let before = self
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("row {} not found in '{}'", id, self.name)))?;

        let mut candidate = before.clone();
        for (column, value) in changes.iter() {
            let canonical = self
                .column(column)
                .ok_or_else(|| Error::ColumnNotFound(column.to_string(), self.name.clone()))?
                .name
                .clone();
            candidate.set(canonical, value.clone());
        }
        let after = self.normalize(&candidate)?;
        self.validate(&after, Some(id), parents)?;

        for index in &self.indexes {
            let mut index = index.write();
            let old_key = index.key_for(&before);
            let new_key = index.key_for(&after);
            if old_key != new_key {
                index.delete(&old_key, id);
                index.insert(new_key, id);
            }
        }
        if let Some(slot) = self.rows.get_mut(&id) {
            *slot = after.clone();
        }
        Ok((before, after))
    }

    /// Subscribe an index to this table's mutations and fill it with the
    /// current rows
    pub fn attach_index(&mut self, handle: IndexHandle) {
        {
            let mut index = handle.write();
            index.clear();
            for (id, row) in &self.rows {
                let key = index.key_for(row);
                index.insert(key, *id);
            }
        }
        self.indexes.push(handle);
    }

    /// Unsubscribe an index by name
    pub fn detach_index(&mut self, name: &str) -> Option<IndexHandle> {
        let pos = self.indexes.iter().position(|i| i.read().name() == name)?;
        Some(self.indexes.remove(pos))
    }

    /// Single-column index covering `column`, if any
    pub fn index_on(&self, column: &str) -> Option<IndexHandle> {
        self.indexes
            .iter()
            .find(|i| i.read().covers(column))
            .cloned()
    }

    pub fn indexes(&self) -> &[IndexHandle] {
        &self.indexes
    }
}
