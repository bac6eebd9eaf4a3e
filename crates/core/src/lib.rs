//! Lumen Core - Core types and schema definitions for the Lumen relational
//! mapping layer.
//!
//! This crate provides the foundational types shared by the storage engine and
//! the mapping layer above it:
//!
//! - `DataType`: Storage data types (Boolean, Int64, Float64, String, DateTime, Bytes, Json)
//! - `Value`: Runtime values that can be stored in a cell
//! - `Row`: A row of values with a store-local identifier
//! - `schema`: Engine-level table definitions (Column, Table, TableBuilder)
//! - `Error`: Error types shared by every Lumen crate
//!
//! # Example
//!
//! ```rust
//! use lumen_core::{DataType, Value, Row};
//! use lumen_core::schema::TableBuilder;
//!
//! let table = TableBuilder::new("users")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .add_primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let row = Row::new(1, vec![Value::Int64(1), Value::String("Alice".into())]);
//!
//! assert_eq!(table.primary_key(), "id");
//! assert_eq!(row.get(1), Some(&Value::String("Alice".into())));
//! ```

mod error;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use row::{Row, RowId};
pub use types::DataType;
pub use value::Value;
