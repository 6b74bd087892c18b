//! Secondary indexes for EmberDB
//!
//! An index maps a key built from one or more column values to the ids of the
//! rows holding that key. Two variants exist:
//! - `Hash`: point lookups only
//! - `Ordered`: point lookups and inclusive range scans in key order

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::table::RowId;
use super::value::{Row, Value};
use crate::error::{Error, Result};

/// Shared handle to an index; held by the registry and by the owning table
pub type IndexHandle = Arc<RwLock<Index>>;

/// A key in an index (wraps Value for comparison)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexKey(pub Vec<Value>);

impl IndexKey {
    /// Create a new index key from a single value
    pub fn new(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    /// Create a new composite index key
    pub fn composite(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// Physical index structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexKind {
    /// Hash map, point lookups only
    #[default]
    Hash,
    /// Sorted map, point lookups and range scans
    Ordered,
}

#[derive(Debug)]
enum IndexEntries {
    Hash(HashMap<IndexKey, Vec<RowId>>),
    Ordered(BTreeMap<IndexKey, Vec<RowId>>),
}

/// Secondary index over one table
#[derive(Debug)]
pub struct Index {
    name: String,
    table_name: String,
    columns: Vec<String>,
    entries: IndexEntries,
    size: usize,
}

impl Index {
    /// Create an empty index
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<String>,
        kind: IndexKind,
    ) -> Self {
        let entries = match kind {
            IndexKind::Hash => IndexEntries::Hash(HashMap::new()),
            IndexKind::Ordered => IndexEntries::Ordered(BTreeMap::new()),
        };
        Self {
            name: name.into(),
            table_name: table_name.into(),
            columns,
            entries,
            size: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn kind(&self) -> IndexKind {
        match self.entries {
            IndexEntries::Hash(_) => IndexKind::Hash,
            IndexEntries::Ordered(_) => IndexKind::Ordered,
        }
    }

    /// Check whether this is a single-column index on `column`
    pub fn covers(&self, column: &str) -> bool {
        self.columns.len() == 1 && self.columns[0].eq_ignore_ascii_case(column)
    }

    /// Build this index's key from a row; absent columns contribute NULL
    pub fn key_for(&self, row: &Row) -> IndexKey {
        IndexKey::composite(
            self.columns
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Number of indexed row ids
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Add a row id under a key
    pub fn insert(&mut self, key: IndexKey, row_id: RowId) {
        let ids = match &mut self.entries {
            IndexEntries::Hash(map) => map.entry(key).or_default(),
            IndexEntries::Ordered(map) => map.entry(key).or_default(),
        };
        ids.push(row_id);
        self.size += 1;
    }

    /// Remove a row id from a key. Returns false if it was not present.
    pub fn delete(&mut self, key: &IndexKey, row_id: RowId) -> bool {
        let removed = match &mut self.entries {
            IndexEntries::Hash(map) => {
                let (removed, now_empty) = remove_id(map.get_mut(key), row_id);
                if now_empty {
                    map.remove(key);
                }
                removed
            }
            IndexEntries::Ordered(map) => {
                let (removed, now_empty) = remove_id(map.get_mut(key), row_id);
                if now_empty {
                    map.remove(key);
                }
                removed
            }
        };
        if removed {
            self.size -= 1;
        }
        removed
    }

    /// Exact-match lookup
    pub fn search(&self, key: &IndexKey) -> Vec<RowId> {
        let ids = match &self.entries {
            IndexEntries::Hash(map) => map.get(key),
            IndexEntries::Ordered(map) => map.get(key),
        };
        ids.cloned().unwrap_or_default()
    }

    /// Inclusive range lookup in increasing key order (ordered indexes only)
    pub fn range_scan(&self, lo: &IndexKey, hi: &IndexKey) -> Result<Vec<RowId>> {
        match &self.entries {
            IndexEntries::Hash(_) => Err(Error::Unsupported(format!(
                "range scan on hash index '{}'",
                self.name
            ))),
            IndexEntries::Ordered(map) => {
                if lo > hi {
                    return Ok(Vec::new());
                }
                Ok(map
                    .range(lo.clone()..=hi.clone())
                    .flat_map(|(_, ids)| ids.iter().copied())
                    .collect())
            }
        }
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        match &mut self.entries {
            IndexEntries::Hash(map) => map.clear(),
            IndexEntries::Ordered(map) => map.clear(),
        }
        self.size = 0;
    }
}

/// Returns (removed, key now has no ids)
fn remove_id(ids: Option<&mut Vec<RowId>>, row_id: RowId) -> (bool, bool) {
    let Some(ids) = ids else {
        return (false, false);
    };
    let Some(pos) = ids.iter().position(|id| *id == row_id) else {
        return (false, false);
    };
    ids.remove(pos);
    (true, ids.is_empty())
}
