//! Access path selection for single-table queries

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::predicate::{CompareOp, Predicate};
use super::query::SelectQuery;
use crate::catalog::TableRepository;
use crate::error::Result;
use crate::storage::IndexManager;

/// How a table is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStrategy {
    /// Read every row
    TableScan,
    /// Equality on a key column; no registered index backs it
    IndexScan,
    /// Equality lookup through a registered index
    IndexSeek,
}

/// Chosen access path for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub table_name: String,
    pub strategy: ExecutionStrategy,
    pub estimated_cost: u64,
    /// Index used by an `IndexSeek`
    pub index_name: Option<String>,
    /// WHERE clause still applied to every candidate row
    pub filter: Option<String>,
}

/// Heuristic optimizer
#[derive(Debug)]
pub struct QueryOptimizer {
    tables: Arc<TableRepository>,
    indexes: Arc<IndexManager>,
}

impl QueryOptimizer {
    pub fn new(tables: Arc<TableRepository>, indexes: Arc<IndexManager>) -> Self {
        Self { tables, indexes }
    }

    /// Choose an access path for a query
    pub fn optimize(&self, query: &SelectQuery) -> Result<ExecutionPlan> {
        let handle = self.tables.get_table(&query.table_name)?;
        let clause = query
            .where_clause
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let predicate = clause.and_then(Predicate::parse);

        // Read what we need and release the table before touching the registry
        let (row_count, key_column_hit, seek_column) = {
            let table = handle.read();
            let key_column_hit = clause.map_or(false, |c| {
                let lowered = c.to_lowercase();
                c.contains('=')
                    && table
                        .unique_columns()
                        .iter()
                        .any(|col| lowered.contains(&col.to_lowercase()))
            });
            let seek_column = predicate
                .as_ref()
                .filter(|p| p.op == CompareOp::Eq)
                .and_then(|p| table.column(&p.column))
                .filter(|c| !c.data_type.is_text())
                .map(|c| c.name.clone());
            (table.row_count() as u64, key_column_hit, seek_column)
        };

        let index = seek_column
            .as_deref()
            .and_then(|column| self.indexes.find_index(&query.table_name, column));

        let (strategy, estimated_cost, index_name) = match index {
            Some(index) => (
                ExecutionStrategy::IndexSeek,
                10 + row_count / 100,
                Some(index.read().name().to_string()),
            ),
            None if key_column_hit => (ExecutionStrategy::IndexScan, 10 + row_count / 100, None),
            None => (ExecutionStrategy::TableScan, row_count, None),
        };

        debug!(
            table = %query.table_name,
            ?strategy,
            estimated_cost,
            "chose access path"
        );

        Ok(ExecutionPlan {
            table_name: query.table_name.clone(),
            strategy,
            estimated_cost,
            index_name,
            filter: clause.map(str::to_string),
        })
    }
}
