//! Transaction Manager
//!
//! At most one transaction is active at a time. While it is active every
//! mutation is recorded in an undo log; rollback replays the log newest
//! first and applies the inverse of each entry. Changes are applied in place
//! as they happen, so commit only discards the log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::TableRepository;
use crate::error::{Error, Result};
use crate::storage::{IndexManager, Row};

/// Kind of a recorded mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationKind {
    CreateTable,
    InsertRow,
    DeleteRow,
    UpdateRow,
}

/// Undo log entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TransactionOperation {
    CreateTable { table: String },
    /// `row` is the after-state of the insert
    InsertRow { table: String, row: Row },
    /// `row` is the before-state of the delete
    DeleteRow { table: String, row: Row },
    UpdateRow { table: String, before: Row, after: Row },
}

impl TransactionOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            TransactionOperation::CreateTable { .. } => OperationKind::CreateTable,
            TransactionOperation::InsertRow { .. } => OperationKind::InsertRow,
            TransactionOperation::DeleteRow { .. } => OperationKind::DeleteRow,
            TransactionOperation::UpdateRow { .. } => OperationKind::UpdateRow,
        }
    }

    pub fn table_name(&self) -> &str {
        match self {
            TransactionOperation::CreateTable { table }
            | TransactionOperation::InsertRow { table, .. }
            | TransactionOperation::DeleteRow { table, .. }
            | TransactionOperation::UpdateRow { table, .. } => table,
        }
    }
}

/// Transaction Context
#[derive(Debug)]
struct Transaction {
    id: u64,
    undo_log: Vec<TransactionOperation>,
}

/// Transaction Manager
#[derive(Debug)]
pub struct TransactionManager {
    tables: Arc<TableRepository>,
    indexes: Arc<IndexManager>,
    /// The active transaction, if any
    active: Mutex<Option<Transaction>>,
    /// Next Transaction ID
    next_trans_id: AtomicU64,
}

impl TransactionManager {
    /// Create a new transaction manager
    pub fn new(tables: Arc<TableRepository>, indexes: Arc<IndexManager>) -> Self {
        Self {
            tables,
            indexes,
            active: Mutex::new(None),
            next_trans_id: AtomicU64::new(1),
        }
    }

    /// Begin a new transaction
    pub fn begin(&self) -> Result<u64> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(Error::TransactionAlreadyActive);
        }
        let id = self.next_trans_id.fetch_add(1, Ordering::SeqCst);
        *active = Some(Transaction {
            id,
            undo_log: Vec::new(),
        });
        info!(transaction = id, "transaction started");
        Ok(id)
    }

    /// Commit the active transaction
    pub fn commit(&self) -> Result<u64> {
        let transaction = self
            .active
            .lock()
            .take()
            .ok_or(Error::NoActiveTransaction)?;
        info!(
            transaction = transaction.id,
            operations = transaction.undo_log.len(),
            "transaction committed"
        );
        Ok(transaction.id)
    }

    /// Undo every recorded operation, newest first.
    ///
    /// Entries that can no longer be applied are skipped. Returns the number
    /// of entries undone.
    pub fn rollback(&self) -> Result<usize> {
        // Leave the active slot before touching any table
        let transaction = self
            .active
            .lock()
            .take()
            .ok_or(Error::NoActiveTransaction)?;

        let total = transaction.undo_log.len();
        let mut undone = 0;
        for operation in transaction.undo_log.into_iter().rev() {
            match self.undo(&operation) {
                Ok(true) => undone += 1,
                Ok(false) => warn!(
                    kind = ?operation.kind(),
                    table = %operation.table_name(),
                    "undo target no longer exists, skipped"
                ),
                Err(e) => warn!(
                    kind = ?operation.kind(),
                    table = %operation.table_name(),
                    error = %e,
                    "undo failed, skipped"
                ),
            }
        }

        info!(
            transaction = transaction.id,
            undone,
            skipped = total - undone,
            "transaction rolled back"
        );
        Ok(undone)
    }

    /// Apply the inverse of one entry. `Ok(false)` means its target is gone.
    fn undo(&self, operation: &TransactionOperation) -> Result<bool> {
        let table_name = operation.table_name();
        let handle = match self.tables.get_table(table_name) {
            Ok(handle) => handle,
            Err(Error::TableNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        match operation {
            TransactionOperation::CreateTable { .. } => {
                self.tables.drop_table(table_name)?;
                self.indexes.drop_table_indexes(table_name);
                Ok(true)
            }
            TransactionOperation::InsertRow { row, .. } => {
                let mut table = handle.write();
                match table.find_row(row) {
                    Some(id) => Ok(table.remove_row(id).is_some()),
                    None => Ok(false),
                }
            }
            TransactionOperation::DeleteRow { row, .. } => {
                self.tables.lock_for_write(table_name)?.insert(row.clone())?;
                Ok(true)
            }
            TransactionOperation::UpdateRow { before, after, .. } => {
                let mut table = self.tables.lock_for_write(table_name)?;
                match table.find_row(after) {
                    Some(id) => {
                        table.update(id, before)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        }
    }

    /// Check whether a transaction is active
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Id of the active transaction
    pub fn current_id(&self) -> Option<u64> {
        self.active.lock().as_ref().map(|t| t.id)
    }

    /// Number of entries in the active undo log (0 when idle)
    pub fn undo_log_len(&self) -> usize {
        self.active.lock().as_ref().map_or(0, |t| t.undo_log.len())
    }

    fn record(&self, operation: TransactionOperation) {
        if let Some(transaction) = self.active.lock().as_mut() {
            debug!(
                transaction = transaction.id,
                kind = ?operation.kind(),
                table = %operation.table_name(),
                "recorded undo entry"
            );
            transaction.undo_log.push(operation);
        }
    }

    pub fn record_table_created(&self, table: &str) {
        self.record(TransactionOperation::CreateTable {
            table: table.to_string(),
        });
    }

    pub fn record_row_inserted(&self, table: &str, row: Row) {
        self.record(TransactionOperation::InsertRow {
            table: table.to_string(),
            row,
        });
    }

    pub fn record_row_deleted(&self, table: &str, row: Row) {
        self.record(TransactionOperation::DeleteRow {
            table: table.to_string(),
            row,
        });
    }

    pub fn record_row_updated(&self, table: &str, before: Row, after: Row) {
        self.record(TransactionOperation::UpdateRow {
            table: table.to_string(),
            before,
            after,
        });
    }
}
