//! Write-side command execution
//!
//! Every command returns an `ExecutionResult`; errors never escape
//! `CommandExecutor::execute`. Mutations made while a transaction is active
//! are recorded in its undo log.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::predicate::Predicate;
use crate::catalog::{ColumnDef, Constraint, TableRepository};
use crate::error::{Error, Result};
use crate::storage::{IndexKind, IndexManager, Row, RowId, Table};
use crate::transaction::TransactionManager;

/// CREATE TABLE
#[derive(Debug, Clone)]
pub struct CreateTableCommand {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    /// Constraints beyond those implied by the column definitions
    pub constraints: Vec<Constraint>,
    pub if_not_exists: bool,
}

impl CreateTableCommand {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
            constraints: Vec::new(),
            if_not_exists: false,
        }
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }
}

/// INSERT of one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertCommand {
    pub table_name: String,
    pub row: Row,
}

/// UPDATE ... SET ... WHERE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCommand {
    pub table_name: String,
    pub set_values: Row,
    /// `None` updates every row
    pub where_clause: Option<String>,
}

/// DELETE ... WHERE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteCommand {
    pub table_name: String,
    /// `None` deletes every row
    pub where_clause: Option<String>,
}

/// CREATE INDEX
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndexCommand {
    pub index_name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    /// Falls back to the configured default kind
    pub kind: Option<IndexKind>,
}

/// DROP TABLE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTableCommand {
    pub table_name: String,
    pub if_exists: bool,
}

/// DROP INDEX
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropIndexCommand {
    pub index_name: String,
}

/// Any write command
#[derive(Debug, Clone)]
pub enum Command {
    CreateTable(CreateTableCommand),
    Insert(InsertCommand),
    Update(UpdateCommand),
    Delete(DeleteCommand),
    CreateIndex(CreateIndexCommand),
    DropTable(DropTableCommand),
    DropIndex(DropIndexCommand),
    Begin,
    Commit,
    Rollback,
}

/// Outcome of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub rows_affected: usize,
    pub message: String,
}

impl ExecutionResult {
    /// Successful result with a message
    pub fn ok(message: impl Into<String>) -> Self {
        Self::with_rows(0, message)
    }

    /// Successful result with an affected row count
    pub fn with_rows(rows_affected: usize, message: impl Into<String>) -> Self {
        Self {
            success: true,
            rows_affected,
            message: message.into(),
        }
    }

    /// Failed result describing an error
    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            rows_affected: 0,
            message: format!("Error: {}", error),
        }
    }
}

/// Executes write commands
#[derive(Debug)]
pub struct CommandExecutor {
    tables: Arc<TableRepository>,
    indexes: Arc<IndexManager>,
    transactions: Arc<TransactionManager>,
    default_index_kind: IndexKind,
}

impl CommandExecutor {
    pub fn new(
        tables: Arc<TableRepository>,
        indexes: Arc<IndexManager>,
        transactions: Arc<TransactionManager>,
        default_index_kind: IndexKind,
    ) -> Self {
        Self {
            tables,
            indexes,
            transactions,
            default_index_kind,
        }
    }

    /// Execute a command, turning any error into a failed result
    pub fn execute(&self, command: &Command) -> ExecutionResult {
        let result = match command {
            Command::CreateTable(cmd) => self.create_table(cmd),
            Command::Insert(cmd) => self.insert(cmd),
            Command::Update(cmd) => self.update(cmd),
            Command::Delete(cmd) => self.delete(cmd),
            Command::CreateIndex(cmd) => self.create_index(cmd),
            Command::DropTable(cmd) => self.drop_table(cmd),
            Command::DropIndex(cmd) => self.drop_index(cmd),
            Command::Begin => self.begin(),
            Command::Commit => self.commit(),
            Command::Rollback => self.rollback(),
        };
        match result {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "command failed");
                ExecutionResult::failure(&e)
            }
        }
    }

    fn create_table(&self, cmd: &CreateTableCommand) -> Result<ExecutionResult> {
        if cmd.if_not_exists && self.tables.table_exists(&cmd.table_name) {
            return Ok(ExecutionResult::ok(format!(
                "Table '{}' already exists",
                cmd.table_name
            )));
        }

        let mut table = Table::from_defs(&cmd.table_name, &cmd.columns)?;
        for constraint in &cmd.constraints {
            table.add_constraint(constraint.clone())?;
        }
        self.tables.create_table(table)?;
        self.transactions.record_table_created(&cmd.table_name);

        info!(table = %cmd.table_name, columns = cmd.columns.len(), "created table");
        Ok(ExecutionResult::ok(format!(
            "Table '{}' created",
            cmd.table_name
        )))
    }

    fn insert(&self, cmd: &InsertCommand) -> Result<ExecutionResult> {
        let mut table = self.tables.lock_for_write(&cmd.table_name)?;

        // Omitted columns take their declared defaults
        let mut row = cmd.row.clone();
        for column in table.columns() {
            if let (false, Some(default)) = (row.contains(&column.name), &column.default) {
                row.set(column.name.clone(), default.clone());
            }
        }

        let id = table.insert(row)?;
        if let Some(stored) = table.row(id) {
            self.transactions
                .record_row_inserted(&cmd.table_name, stored.clone());
        }

        debug!(table = %cmd.table_name, row = %id, "inserted row");
        Ok(ExecutionResult::with_rows(1, "1 row inserted"))
    }

    fn update(&self, cmd: &UpdateCommand) -> Result<ExecutionResult> {
        let mut table = self.tables.lock_for_write(&cmd.table_name)?;
        let targets = matching_rows(&table, cmd.where_clause.as_deref());

        let mut applied: Vec<(RowId, Row, Row)> = Vec::with_capacity(targets.len());
        for id in targets {
            match table.update(id, &cmd.set_values) {
                Ok((before, after)) => applied.push((id, before, after)),
                Err(e) => {
                    // Put back the rows this command already changed
                    for (id, before, _) in applied.iter().rev() {
                        if let Err(revert) = table.update(*id, before) {
                            warn!(row = %id, error = %revert, "could not revert updated row");
                        }
                    }
                    return Err(e);
                }
            }
        }

        let count = applied.len();
        for (_, before, after) in applied {
            self.transactions
                .record_row_updated(&cmd.table_name, before, after);
        }

        debug!(table = %cmd.table_name, rows = count, "updated rows");
        Ok(ExecutionResult::with_rows(
            count,
            format!("{} row(s) updated", count),
        ))
    }

    fn delete(&self, cmd: &DeleteCommand) -> Result<ExecutionResult> {
        let handle = self.tables.get_table(&cmd.table_name)?;
        let mut table = handle.write();
        let targets = matching_rows(&table, cmd.where_clause.as_deref());

        let mut count = 0;
        for id in targets {
            if let Some(removed) = table.remove_row(id) {
                self.transactions.record_row_deleted(&cmd.table_name, removed);
                count += 1;
            }
        }

        debug!(table = %cmd.table_name, rows = count, "deleted rows");
        Ok(ExecutionResult::with_rows(
            count,
            format!("{} row(s) deleted", count),
        ))
    }

    fn create_index(&self, cmd: &CreateIndexCommand) -> Result<ExecutionResult> {
        let kind = cmd.kind.unwrap_or(self.default_index_kind);
        self.indexes
            .create_index(&cmd.table_name, &cmd.index_name, &cmd.columns, kind)?;
        Ok(ExecutionResult::ok(format!(
            "Index '{}' created on '{}'",
            cmd.index_name, cmd.table_name
        )))
    }

    fn drop_table(&self, cmd: &DropTableCommand) -> Result<ExecutionResult> {
        if cmd.if_exists && !self.tables.table_exists(&cmd.table_name) {
            return Ok(ExecutionResult::ok(format!(
                "Table '{}' does not exist",
                cmd.table_name
            )));
        }

        self.tables.drop_table(&cmd.table_name)?;
        let dropped_indexes = self.indexes.drop_table_indexes(&cmd.table_name);

        info!(table = %cmd.table_name, dropped_indexes, "dropped table");
        Ok(ExecutionResult::ok(format!(
            "Table '{}' dropped",
            cmd.table_name
        )))
    }

    fn drop_index(&self, cmd: &DropIndexCommand) -> Result<ExecutionResult> {
        self.indexes.drop_index(&cmd.index_name)?;
        Ok(ExecutionResult::ok(format!(
            "Index '{}' dropped",
            cmd.index_name
        )))
    }

    fn begin(&self) -> Result<ExecutionResult> {
        let id = self.transactions.begin()?;
        Ok(ExecutionResult::ok(format!("Transaction {} started", id)))
    }

    fn commit(&self) -> Result<ExecutionResult> {
        let id = self.transactions.commit()?;
        Ok(ExecutionResult::ok(format!("Transaction {} committed", id)))
    }

    fn rollback(&self) -> Result<ExecutionResult> {
        let id = self.transactions.current_id();
        let undone = self.transactions.rollback()?;
        let message = match id {
            Some(id) => format!("Transaction {} rolled back", id),
            None => "Transaction rolled back".to_string(),
        };
        Ok(ExecutionResult::with_rows(undone, message))
    }
}

/// Rows selected by a WHERE clause. A missing, blank or unparsable clause
/// selects every row.
fn matching_rows(table: &Table, clause: Option<&str>) -> Vec<RowId> {
    let clause = clause.map(str::trim).filter(|c| !c.is_empty());
    let predicate = clause.and_then(|c| {
        let parsed = Predicate::parse(c);
        if parsed.is_none() {
            debug!(clause = c, "unparsable WHERE clause, no filter applied");
        }
        parsed
    });
    table
        .rows()
        .filter(|(_, row)| predicate.as_ref().map_or(true, |p| p.matches(row)))
        .map(|(id, _)| id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CheckRule, DataType};
    use crate::storage::Value;

    fn setup() -> (Arc<TableRepository>, Arc<TransactionManager>, CommandExecutor) {
        let repo = Arc::new(TableRepository::new());
        let indexes = Arc::new(IndexManager::new(repo.clone()));
        let transactions = Arc::new(TransactionManager::new(repo.clone(), indexes.clone()));
        let executor = CommandExecutor::new(
            repo.clone(),
            indexes,
            transactions.clone(),
            IndexKind::Hash,
        );
        (repo, transactions, executor)
    }

    fn create_products(executor: &CommandExecutor) {
        let cmd = CreateTableCommand::new(
            "products",
            vec![
                ColumnDef::new("id", DataType::Int).primary_key(true),
                ColumnDef::new("name", DataType::Varchar(Some(20))).nullable(false),
                ColumnDef::new("price", DataType::Decimal),
                ColumnDef::new("active", DataType::Bool).default(true),
            ],
        )
        .constraint(Constraint::check("price", CheckRule::positive_number("price")));
        let result = executor.execute(&Command::CreateTable(cmd));
        assert!(result.success, "{}", result.message);
    }

    fn insert(executor: &CommandExecutor, id: i64, name: &str, price: f64) -> ExecutionResult {
        executor.execute(&Command::Insert(InsertCommand {
            table_name: "products".to_string(),
            row: Row::new().with("id", id).with("name", name).with("price", price),
        }))
    }

    #[test]
    fn test_create_table() {
        let (repo, _, executor) = setup();
        create_products(&executor);
        assert!(repo.table_exists("products"));

        let again = CreateTableCommand::new("products", vec![ColumnDef::new("x", DataType::Int)]);
        let result = executor.execute(&Command::CreateTable(again.clone()));
        assert!(!result.success);
        assert!(result.message.starts_with("Error: "));

        let result = executor.execute(&Command::CreateTable(again.if_not_exists(true)));
        assert!(result.success);
        assert!(result.message.contains("already exists"));
    }

    #[test]
    fn test_insert_fills_defaults() {
        let (repo, _, executor) = setup();
        create_products(&executor);

        let result = insert(&executor, 1, "pen", 1.5);
        assert!(result.success, "{}", result.message);
        assert_eq!(result.rows_affected, 1);

        let table = repo.get_table("products").unwrap();
        let table = table.read();
        let (_, row) = table.rows().next().unwrap();
        assert_eq!(row.get("active"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_insert_failures_are_reported() {
        let (_, _, executor) = setup();
        create_products(&executor);

        let result = insert(&executor, 1, "pen", -1.0);
        assert!(!result.success);
        assert!(result.message.contains("price > 0"));

        let result = executor.execute(&Command::Insert(InsertCommand {
            table_name: "missing".to_string(),
            row: Row::new(),
        }));
        assert!(!result.success);
        assert!(result.message.contains("missing"));
    }

    #[test]
    fn test_update_and_delete() {
        let (repo, _, executor) = setup();
        create_products(&executor);
        insert(&executor, 1, "pen", 1.5);
        insert(&executor, 2, "ink", 3.0);
        insert(&executor, 3, "pad", 4.5);

        let result = executor.execute(&Command::Update(UpdateCommand {
            table_name: "products".to_string(),
            set_values: Row::new().with("price", 5),
            where_clause: Some("price >= 3".to_string()),
        }));
        assert!(result.success, "{}", result.message);
        assert_eq!(result.rows_affected, 2);
        assert_eq!(result.message, "2 row(s) updated");

        let result = executor.execute(&Command::Delete(DeleteCommand {
            table_name: "products".to_string(),
            where_clause: Some("price = 5".to_string()),
        }));
        assert_eq!(result.rows_affected, 2);
        assert_eq!(repo.get_table("products").unwrap().read().row_count(), 1);
    }

    #[test]
    fn test_unparsable_where_touches_every_row() {
        let (repo, _, executor) = setup();
        create_products(&executor);
        insert(&executor, 1, "pen", 1.5);
        insert(&executor, 2, "ink", 3.0);
        insert(&executor, 3, "pad", 4.5);

        let result = executor.execute(&Command::Update(UpdateCommand {
            table_name: "products".to_string(),
            set_values: Row::new().with("price", 9),
            where_clause: Some("price BETWEEN 1 AND 2".to_string()),
        }));
        assert!(result.success, "{}", result.message);
        assert_eq!(result.rows_affected, 3);

        let result = executor.execute(&Command::Delete(DeleteCommand {
            table_name: "products".to_string(),
            where_clause: Some("id BETWEEN 1 AND 2".to_string()),
        }));
        assert!(result.success, "{}", result.message);
        assert_eq!(result.rows_affected, 3);
        assert_eq!(result.message, "3 row(s) deleted");
        assert_eq!(repo.get_table("products").unwrap().read().row_count(), 0);
    }

    #[test]
    fn test_insert_json_with_duplicate_columns_is_rejected() {
        let json = r#"{"table_name":"products","row":{"id":{"Integer":1},"ID":{"Integer":2}}}"#;
        assert!(serde_json::from_str::<InsertCommand>(json).is_err());

        let json = r#"{"table_name":"products","row":{"id":{"Integer":1},"name":{"Text":"pen"},"price":{"Decimal":2.0}}}"#;
        let cmd: InsertCommand = serde_json::from_str(json).unwrap();
        let (repo, _, executor) = setup();
        create_products(&executor);
        let result = executor.execute(&Command::Insert(cmd));
        assert!(result.success, "{}", result.message);
        assert_eq!(repo.get_table("products").unwrap().read().row_count(), 1);
    }

    #[test]
    fn test_failed_update_changes_nothing() {
        let (repo, _, executor) = setup();
        create_products(&executor);
        insert(&executor, 1, "pen", 1.5);
        insert(&executor, 2, "ink", 3.0);

        // The second row collides with the first once ids are equal
        let result = executor.execute(&Command::Update(UpdateCommand {
            table_name: "products".to_string(),
            set_values: Row::new().with("id", 7),
            where_clause: None,
        }));
        assert!(!result.success);

        let table = repo.get_table("products").unwrap();
        let ids: Vec<i64> = table
            .read()
            .rows()
            .filter_map(|(_, r)| r.get("id").and_then(Value::as_i64))
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_transaction_commands() {
        let (repo, transactions, executor) = setup();
        create_products(&executor);
        insert(&executor, 1, "pen", 1.5);

        let result = executor.execute(&Command::Begin);
        assert!(result.message.contains("started"));
        assert!(!executor.execute(&Command::Begin).success);

        insert(&executor, 2, "ink", 3.0);
        executor.execute(&Command::Update(UpdateCommand {
            table_name: "products".to_string(),
            set_values: Row::new().with("name", "quill"),
            where_clause: Some("id = 1".to_string()),
        }));
        executor.execute(&Command::Delete(DeleteCommand {
            table_name: "products".to_string(),
            where_clause: Some("id = 1".to_string()),
        }));
        assert_eq!(transactions.undo_log_len(), 3);

        let result = executor.execute(&Command::Rollback);
        assert!(result.message.contains("rolled back"));
        assert_eq!(result.rows_affected, 3);

        let table = repo.get_table("products").unwrap();
        let table = table.read();
        assert_eq!(table.row_count(), 1);
        let (_, row) = table.rows().next().unwrap();
        assert_eq!(row.get("name"), Some(&Value::from("pen")));

        assert!(!executor.execute(&Command::Commit).success);
    }

    #[test]
    fn test_index_and_drop_commands() {
        let (repo, _, executor) = setup();
        create_products(&executor);

        let result = executor.execute(&Command::CreateIndex(CreateIndexCommand {
            index_name: "idx_price".to_string(),
            table_name: "products".to_string(),
            columns: vec!["price".to_string()],
            kind: Some(IndexKind::Ordered),
        }));
        assert!(result.success, "{}", result.message);

        let result = executor.execute(&Command::DropIndex(DropIndexCommand {
            index_name: "idx_price".to_string(),
        }));
        assert!(result.success);
        assert!(!executor
            .execute(&Command::DropIndex(DropIndexCommand {
                index_name: "idx_price".to_string(),
            }))
            .success);

        let drop = DropTableCommand {
            table_name: "products".to_string(),
            if_exists: false,
        };
        assert!(executor.execute(&Command::DropTable(drop.clone())).success);
        assert!(!repo.table_exists("products"));
        assert!(!executor.execute(&Command::DropTable(drop)).success);

        let result = executor.execute(&Command::DropTable(DropTableCommand {
            table_name: "products".to_string(),
            if_exists: true,
        }));
        assert!(result.success);
    }
}
