//! Catalog module
//!
//! This module contains data types, schema definitions, constraints and the
//! table repository.

pub mod constraint;
pub mod repository;
pub mod schema;
pub mod types;

pub use constraint::{
    CheckRule, Constraint, ConstraintKind, NoParentTables, ParentLookup, ValidationContext,
};
pub use repository::TableRepository;
pub use schema::{Column, ColumnDef};
pub use types::DataType;
