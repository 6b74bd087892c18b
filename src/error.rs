//! Error types for EmberDB
//!
//! This module defines all error types used throughout the database engine.

use thiserror::Error;

/// The main error type for EmberDB
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ========== Catalog Errors ==========
    #[error("Catalog error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Catalog error: table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Catalog error: column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Catalog error: column '{0}' already exists in table '{1}'")]
    ColumnAlreadyExists(String, String),

    #[error("Catalog error: index '{0}' not found")]
    IndexNotFound(String),

    #[error("Catalog error: index '{0}' already exists")]
    IndexAlreadyExists(String),

    // ========== Type Errors ==========
    #[error("Type error: invalid value for column '{column}', expected {expected}, got {found}")]
    InvalidDataType {
        column: String,
        expected: String,
        found: String,
    },

    // ========== Constraint Errors ==========
    #[error("Constraint error: expected {expected} values, got {found}")]
    ColumnCountMismatch { expected: usize, found: usize },

    #[error("Constraint error: no value for column '{0}' in table '{1}'")]
    MissingValue(String, String),

    #[error("Constraint error: {}", .0.join("; "))]
    ConstraintViolation(Vec<String>),

    #[error("Constraint error: foreign key '{0}' cannot resolve its parent table")]
    UnresolvedForeignKey(String),

    // ========== Execution Errors ==========
    #[error("Execution error: unsupported operation - {0}")]
    Unsupported(String),

    // ========== Transaction Errors ==========
    #[error("Transaction error: a transaction is already active")]
    TransactionAlreadyActive,

    #[error("Transaction error: no active transaction")]
    NoActiveTransaction,

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Config(String),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Messages carried by a constraint violation, empty for every other error
    pub fn violations(&self) -> &[String] {
        match self {
            Error::ConstraintViolation(messages) => messages,
            _ => &[],
        }
    }
}

/// Result type alias for EmberDB operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Catalog error: table 'users' not found");

        let err = Error::InvalidDataType {
            column: "age".to_string(),
            expected: "INT".to_string(),
            found: "VARCHAR".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Type error: invalid value for column 'age', expected INT, got VARCHAR"
        );

        let err = Error::MissingValue("name".to_string(), "t".to_string());
        assert_eq!(
            err.to_string(),
            "Constraint error: no value for column 'name' in table 't'"
        );
    }

    #[test]
    fn test_constraint_violation_joins_messages() {
        let err = Error::ConstraintViolation(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "Constraint error: first; second");
        assert_eq!(err.violations().len(), 2);
        assert!(Error::NoActiveTransaction.violations().is_empty());
    }
}
