//! Storage engine module
//!
//! This module contains the in-memory storage components:
//! - Values and rows
//! - Tables with constraint enforcement
//! - Hash and ordered secondary indexes
//! - Index registry

pub mod index;
pub mod index_manager;
pub mod table;
pub mod value;

pub use index::{Index, IndexHandle, IndexKey, IndexKind};
pub use index_manager::IndexManager;
pub use table::{RowId, Table, TableHandle};
pub use value::{Row, Value};
