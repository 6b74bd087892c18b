//! Table repository for EmberDB
//!
//! Name-keyed registry of live tables. Lookups take a shared lock on the
//! registry; create and drop take it exclusively. Each table has its own
//! lock, so work on one table never blocks the registry.
//!
//! A writer that checks foreign keys holds its table and the parent tables
//! at once. Those locks are always taken in table-name order.

use std::collections::{BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};
use tracing::debug;

use super::constraint::ParentLookup;
use crate::error::{Error, Result};
use crate::storage::{Row, RowId, Table, TableHandle, Value};

/// Registry of tables by name
#[derive(Debug, Default)]
pub struct TableRepository {
    tables: RwLock<HashMap<String, TableHandle>>,
}

impl TableRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table
    pub fn create_table(&self, table: Table) -> Result<TableHandle> {
        let mut tables = self.tables.write();

        if tables.contains_key(table.name()) {
            return Err(Error::TableAlreadyExists(table.name().to_string()));
        }

        let name = table.name().to_string();
        let handle = Arc::new(RwLock::new(table));
        tables.insert(name.clone(), handle.clone());
        debug!(table = %name, "registered table");
        Ok(handle)
    }

    /// Get a table by name
    pub fn get_table(&self, name: &str) -> Result<TableHandle> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Check if a table exists
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Remove a table, returning its handle
    pub fn drop_table(&self, name: &str) -> Result<TableHandle> {
        let handle = self
            .tables
            .write()
            .remove(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        debug!(table = %name, "dropped table");
        Ok(handle)
    }

    /// Table names in ascending order
    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Lock a table for writing together with the tables its foreign keys
    /// reference, which are locked for reading. Parents dropped in the
    /// meantime are left out and later resolve as missing.
    pub fn lock_for_write(&self, name: &str) -> Result<TableWriteLock> {
        let handle = self.get_table(name)?;
        let parent_names: BTreeSet<String> = handle
            .read()
            .foreign_key_parents()
            .map(str::to_string)
            .collect();

        let mut order: Vec<(String, TableHandle)> = parent_names
            .into_iter()
            .filter_map(|parent| self.get_table(&parent).ok().map(|h| (parent, h)))
            .collect();
        order.push((name.to_string(), handle));
        order.sort_by(|a, b| a.0.cmp(&b.0));

        let mut table = None;
        let mut parents = Vec::with_capacity(order.len() - 1);
        for (table_name, handle) in order {
            if table_name == name {
                table = Some(handle.write_arc());
            } else {
                parents.push((table_name, handle.read_arc()));
            }
        }
        let table =
            table.ok_or_else(|| Error::Internal(format!("table '{}' lost while locking", name)))?;
        Ok(TableWriteLock {
            table,
            parents: LockedParents(parents),
        })
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

/// Read locks on the parent tables of a [`TableWriteLock`]
pub struct LockedParents(Vec<(String, ArcRwLockReadGuard<RawRwLock, Table>)>);

impl ParentLookup for LockedParents {
    fn parent_contains(&self, table: &str, column: &str, value: &Value) -> Result<bool> {
        let parent = self
            .0
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, guard)| guard)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;
        if !parent.has_column(column) {
            return Err(Error::ColumnNotFound(column.to_string(), table.to_string()));
        }
        Ok(parent.column_contains(column, value, None))
    }
}

/// A table locked for writing, with its foreign-key parents locked for
/// reading. Dereferences to the table.
pub struct TableWriteLock {
    table: ArcRwLockWriteGuard<RawRwLock, Table>,
    parents: LockedParents,
}

impl TableWriteLock {
    /// Validate and insert a row, resolving foreign keys against the
    /// locked parents
    pub fn insert(&mut self, row: Row) -> Result<RowId> {
        self.table.add_row_with(row, &self.parents)
    }

    /// Update one row, resolving foreign keys against the locked parents
    pub fn update(&mut self, id: RowId, changes: &Row) -> Result<(Row, Row)> {
        self.table.update_row(id, changes, &self.parents)
    }
}

impl Deref for TableWriteLock {
    type Target = Table;

    fn deref(&self) -> &Table {
        &self.table
    }
}

impl DerefMut for TableWriteLock {
    fn deref_mut(&mut self) -> &mut Table {
        &mut self.table
    }
}

impl ParentLookup for TableRepository {
    fn parent_contains(&self, table: &str, column: &str, value: &Value) -> Result<bool> {
        let handle = self.get_table(table)?;
        let parent = handle.read();
        if !parent.has_column(column) {
            return Err(Error::ColumnNotFound(column.to_string(), table.to_string()));
        }
        Ok(parent.column_contains(column, value, None))
    }
}
