//! Transaction module
//!
//! Single active transaction with an in-memory undo log.

pub mod transaction;

pub use transaction::{OperationKind, TransactionManager, TransactionOperation};
