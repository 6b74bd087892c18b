//! Index registry for EmberDB
//!
//! Indexes are registered by name. A created index is also attached to its
//! table, which keeps it current on every row mutation.
//!
//! Lock order is registry, then table, then index. Lookups release the index
//! lock before resolving row ids against the table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::index::{Index, IndexHandle, IndexKey, IndexKind};
use super::value::Row;
use crate::catalog::TableRepository;
use crate::error::{Error, Result};

/// Registry of indexes by name
#[derive(Debug)]
pub struct IndexManager {
    tables: Arc<TableRepository>,
    indexes: RwLock<HashMap<String, IndexHandle>>,
}

impl IndexManager {
    pub fn new(tables: Arc<TableRepository>) -> Self {
        Self {
            tables,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Build an index over existing rows and attach it to the table
    pub fn create_index(
        &self,
        table_name: &str,
        index_name: &str,
        columns: &[String],
        kind: IndexKind,
    ) -> Result<IndexHandle> {
        let mut indexes = self.indexes.write();
        if indexes.contains_key(index_name) {
            return Err(Error::IndexAlreadyExists(index_name.to_string()));
        }
        if columns.is_empty() {
            return Err(Error::Unsupported(format!(
                "index '{}' has no columns",
                index_name
            )));
        }

        let table = self.tables.get_table(table_name)?;
        let mut table = table.write();
        let mut resolved = Vec::with_capacity(columns.len());
        for column in columns {
            let column = table
                .column(column)
                .ok_or_else(|| Error::ColumnNotFound(column.clone(), table_name.to_string()))?;
            resolved.push(column.name.clone());
        }

        let handle = Arc::new(RwLock::new(Index::new(
            index_name, table_name, resolved, kind,
        )));
        table.attach_index(handle.clone());
        indexes.insert(index_name.to_string(), handle.clone());

        info!(
            index = %index_name,
            table = %table_name,
            kind = ?kind,
            entries = handle.read().len(),
            "created index"
        );
        Ok(handle)
    }

    /// Unregister an index and detach it from its table
    pub fn drop_index(&self, index_name: &str) -> Result<()> {
        let handle = self
            .indexes
            .write()
            .remove(index_name)
            .ok_or_else(|| Error::IndexNotFound(index_name.to_string()))?;

        let table_name = handle.read().table_name().to_string();
        // The table may already be gone
        if let Ok(table) = self.tables.get_table(&table_name) {
            table.write().detach_index(index_name);
        }
        info!(index = %index_name, table = %table_name, "dropped index");
        Ok(())
    }

    /// Unregister every index on a table. Returns how many were removed.
    pub fn drop_table_indexes(&self, table_name: &str) -> usize {
        let mut indexes = self.indexes.write();
        let before = indexes.len();
        indexes.retain(|_, index| index.read().table_name() != table_name);
        before - indexes.len()
    }

    /// Repopulate an index from its table's rows
    pub fn rebuild_index(&self, index_name: &str) -> Result<()> {
        let handle = self.get_index(index_name)?;
        let table_name = handle.read().table_name().to_string();
        let table = self.tables.get_table(&table_name)?;
        let mut table = table.write();
        table.detach_index(index_name);
        table.attach_index(handle);
        debug!(index = %index_name, "rebuilt index");
        Ok(())
    }

    /// Get an index by name
    pub fn get_index(&self, index_name: &str) -> Result<IndexHandle> {
        self.indexes
            .read()
            .get(index_name)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(index_name.to_string()))
    }

    /// Registered single-column index on `table.column`, if any.
    ///
    /// When several qualify, the one with the smallest name wins.
    pub fn find_index(&self, table_name: &str, column: &str) -> Option<IndexHandle> {
        let indexes = self.indexes.read();
        let mut candidates: Vec<(&String, &IndexHandle)> = indexes
            .iter()
            .filter(|(_, h)| {
                let index = h.read();
                index.table_name() == table_name && index.covers(column)
            })
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(b.0));
        candidates.first().map(|(_, h)| (*h).clone())
    }

    /// Exact-match lookup, resolved to rows
    pub fn search(&self, index_name: &str, key: &IndexKey) -> Result<Vec<Row>> {
        let handle = self.get_index(index_name)?;
        let (table_name, ids) = {
            let index = handle.read();
            (index.table_name().to_string(), index.search(key))
        };
        let table = self.tables.get_table(&table_name)?;
        let rows = table.read().rows_by_ids(&ids);
        Ok(rows)
    }

    /// Inclusive range lookup, resolved to rows in key order
    pub fn range_scan(&self, index_name: &str, lo: &IndexKey, hi: &IndexKey) -> Result<Vec<Row>> {
        let handle = self.get_index(index_name)?;
        let (table_name, ids) = {
            let index = handle.read();
            (index.table_name().to_string(), index.range_scan(lo, hi)?)
        };
        let table = self.tables.get_table(&table_name)?;
        let rows = table.read().rows_by_ids(&ids);
        Ok(rows)
    }

    /// All index names in ascending order
    pub fn list_indexes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of the indexes on one table, in ascending order
    pub fn table_indexes(&self, table_name: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .indexes
            .read()
            .iter()
            .filter(|(_, h)| h.read().table_name() == table_name)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, DataType};
    use crate::storage::{Table, Value};

    fn setup() -> (Arc<TableRepository>, IndexManager) {
        let repo = Arc::new(TableRepository::new());
        let table = Table::from_defs(
            "people",
            &[
                ColumnDef::new("id", DataType::Int).primary_key(true),
                ColumnDef::new("age", DataType::Int),
            ],
        )
        .unwrap();
        let handle = repo.create_table(table).unwrap();
        {
            let mut table = handle.write();
            for (id, age) in [(1, 30), (2, 25), (3, 30), (4, 41)] {
                table
                    .add_row(Row::new().with("id", id).with("age", age))
                    .unwrap();
            }
        }
        let manager = IndexManager::new(repo.clone());
        (repo, manager)
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter()
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .collect()
    }

    #[test]
    fn test_create_index_populates() {
        let (_, manager) = setup();
        let handle = manager
            .create_index("people", "idx_age", &cols(&["AGE"]), IndexKind::Hash)
            .unwrap();
        assert_eq!(handle.read().len(), 4);
        assert_eq!(handle.read().columns(), &["age".to_string()]);

        let rows = manager.search("idx_age", &IndexKey::new(30)).unwrap();
        assert_eq!(ids(&rows), vec![1, 3]);
    }

    #[test]
    fn test_create_index_errors() {
        let (_, manager) = setup();
        manager
            .create_index("people", "idx_age", &cols(&["age"]), IndexKind::Hash)
            .unwrap();

        let dup = manager.create_index("people", "idx_age", &cols(&["id"]), IndexKind::Hash);
        assert!(matches!(dup, Err(Error::IndexAlreadyExists(_))));

        let missing = manager.create_index("nope", "idx_x", &cols(&["id"]), IndexKind::Hash);
        assert!(matches!(missing, Err(Error::TableNotFound(_))));

        let bad_col = manager.create_index("people", "idx_y", &cols(&["zzz"]), IndexKind::Hash);
        assert!(matches!(bad_col, Err(Error::ColumnNotFound(_, _))));
        assert_eq!(manager.list_indexes(), vec!["idx_age"]);
    }

    #[test]
    fn test_range_scan_by_kind() {
        let (_, manager) = setup();
        manager
            .create_index("people", "idx_hash", &cols(&["age"]), IndexKind::Hash)
            .unwrap();
        manager
            .create_index("people", "idx_ordered", &cols(&["age"]), IndexKind::Ordered)
            .unwrap();

        let result = manager.range_scan("idx_hash", &IndexKey::new(20), &IndexKey::new(35));
        assert!(matches!(result, Err(Error::Unsupported(_))));

        let rows = manager
            .range_scan("idx_ordered", &IndexKey::new(25), &IndexKey::new(30))
            .unwrap();
        assert_eq!(ids(&rows), vec![2, 1, 3]);
    }

    #[test]
    fn test_index_follows_table_mutations() {
        let (repo, manager) = setup();
        manager
            .create_index("people", "idx_age", &cols(&["age"]), IndexKind::Ordered)
            .unwrap();

        let table = repo.get_table("people").unwrap();
        table
            .write()
            .add_row(Row::new().with("id", 5).with("age", 30))
            .unwrap();
        let rows = manager.search("idx_age", &IndexKey::new(30)).unwrap();
        assert_eq!(ids(&rows), vec![1, 3, 5]);

        let first = table.read().find_row(&Row::new().with("id", 1).with("age", 30));
        table.write().remove_row(first.unwrap());
        let rows = manager.search("idx_age", &IndexKey::new(30)).unwrap();
        assert_eq!(ids(&rows), vec![3, 5]);
    }

    #[test]
    fn test_drop_and_rebuild() {
        let (repo, manager) = setup();
        manager
            .create_index("people", "idx_age", &cols(&["age"]), IndexKind::Hash)
            .unwrap();
        manager.rebuild_index("idx_age").unwrap();
        assert_eq!(manager.get_index("idx_age").unwrap().read().len(), 4);

        manager.drop_index("idx_age").unwrap();
        assert!(matches!(manager.get_index("idx_age"), Err(Error::IndexNotFound(_))));
        assert!(matches!(manager.drop_index("idx_age"), Err(Error::IndexNotFound(_))));
        assert!(repo.get_table("people").unwrap().read().indexes().is_empty());
    }

    #[test]
    fn test_table_indexes_and_find() {
        let (_, manager) = setup();
        manager
            .create_index("people", "idx_b", &cols(&["age"]), IndexKind::Hash)
            .unwrap();
        manager
            .create_index("people", "idx_a", &cols(&["age"]), IndexKind::Ordered)
            .unwrap();
        manager
            .create_index("people", "idx_pair", &cols(&["id", "age"]), IndexKind::Hash)
            .unwrap();

        assert_eq!(manager.table_indexes("people"), vec!["idx_a", "idx_b", "idx_pair"]);
        let found = manager.find_index("people", "age").unwrap();
        assert_eq!(found.read().name(), "idx_a");
        assert!(manager.find_index("people", "id").is_none());

        assert_eq!(manager.drop_table_indexes("people"), 3);
        assert!(manager.list_indexes().is_empty());
    }
}
