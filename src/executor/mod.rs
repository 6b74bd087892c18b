//! Query execution module
//!
//! This module contains predicate evaluation, the read and write executors,
//! the access path optimizer and join planning.

pub mod command;
pub mod join;
pub mod optimizer;
pub mod predicate;
pub mod query;

pub use command::{
    Command, CommandExecutor, CreateIndexCommand, CreateTableCommand, DeleteCommand,
    DropIndexCommand, DropTableCommand, ExecutionResult, InsertCommand, UpdateCommand,
};
pub use join::{JoinAlgorithm, JoinPlan, JoinStrategy};
pub use optimizer::{ExecutionPlan, ExecutionStrategy, QueryOptimizer};
pub use predicate::{CompareOp, Predicate};
pub use query::{JoinQuery, JoinType, Query, QueryExecutor, QueryResult, SelectQuery};
