//! EmberDB - An in-memory relational database engine written in Rust
//!
//! This library provides the core components of the engine:
//! - Catalog (data types, schemas, constraints, table repository)
//! - Storage (values, rows, tables, hash and ordered indexes)
//! - Query execution (predicates, select/join, commands, optimizer)
//! - Transactions (single active transaction with an undo log)

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod logging;
pub mod storage;
pub mod transaction;

pub use config::EngineConfig;
pub use database::Database;
pub use error::{Error, Result};
