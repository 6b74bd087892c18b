//! Database facade
//!
//! Wires the table repository, index registry, transaction manager and both
//! executors together behind one handle.

use std::sync::Arc;

use crate::catalog::TableRepository;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::{
    Command, CommandExecutor, ExecutionPlan, ExecutionResult, JoinPlan, JoinQuery, Query,
    QueryExecutor, QueryResult, SelectQuery,
};
use crate::storage::IndexManager;
use crate::transaction::TransactionManager;

/// An in-memory database
#[derive(Debug)]
pub struct Database {
    config: EngineConfig,
    tables: Arc<TableRepository>,
    indexes: Arc<IndexManager>,
    transactions: Arc<TransactionManager>,
    commands: CommandExecutor,
    queries: QueryExecutor,
}

impl Default for Database {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Database {
    /// Create an empty database
    pub fn new(config: EngineConfig) -> Self {
        let tables = Arc::new(TableRepository::new());
        let indexes = Arc::new(IndexManager::new(tables.clone()));
        let transactions = Arc::new(TransactionManager::new(tables.clone(), indexes.clone()));
        let commands = CommandExecutor::new(
            tables.clone(),
            indexes.clone(),
            transactions.clone(),
            config.default_index_kind,
        );
        let queries = QueryExecutor::new(tables.clone(), indexes.clone(), &config);

        Self {
            config,
            tables,
            indexes,
            transactions,
            commands,
            queries,
        }
    }

    /// Run a write command
    pub fn execute(&self, command: &Command) -> ExecutionResult {
        self.commands.execute(command)
    }

    /// Run a read query
    pub fn query(&self, query: &Query) -> Result<QueryResult> {
        self.queries.execute(query)
    }

    pub fn select(&self, query: &SelectQuery) -> Result<QueryResult> {
        self.queries.execute_select(query)
    }

    pub fn join(&self, query: &JoinQuery) -> Result<QueryResult> {
        self.queries.execute_join(query)
    }

    pub fn explain(&self, query: &SelectQuery) -> Result<ExecutionPlan> {
        self.queries.explain(query)
    }

    pub fn explain_join(&self, query: &JoinQuery) -> Result<JoinPlan> {
        self.queries.explain_join(query)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tables(&self) -> &Arc<TableRepository> {
        &self.tables
    }

    pub fn indexes(&self) -> &Arc<IndexManager> {
        &self.indexes
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }
}
