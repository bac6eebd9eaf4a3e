//! Lumen Storage - In-memory relational engine behind the Lumen mapping layer.
//!
//! This crate provides the storage layer including:
//!
//! - `RowStore`: Row storage with primary key and unique index maintenance
//! - `TableCache`: Multi-table cache management
//! - `Journal`: Change tracking for transactions
//! - `Transaction`: Transaction management with rollback support
//! - `ConstraintChecker`: Not-null and type validation
//! - `Connection`: Shared handle running selects, atomic statement batches
//!   and change observation
//!
//! # Example
//!
//! ```rust
//! use lumen_storage::Connection;
//! use lumen_core::schema::TableBuilder;
//! use lumen_core::{DataType, Value};
//! use lumen_query::ast::{InsertStatement, Statement};
//!
//! let schema = TableBuilder::new("users")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("name", DataType::String)
//!     .unwrap()
//!     .add_primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let connection = Connection::open(vec![schema]).unwrap();
//!
//! let summary = connection
//!     .execute(vec![Statement::Insert(InsertStatement {
//!         table: "users".into(),
//!         rows: vec![vec![
//!             ("id".into(), Value::Int64(1)),
//!             ("name".into(), Value::from("Alice")),
//!         ]],
//!         replace: false,
//!     })])
//!     .unwrap();
//!
//! assert_eq!(summary.inserted, 1);
//! assert_eq!(connection.row_count("users"), 1);
//! ```

pub mod cache;
pub mod connection;
pub mod constraint;
pub mod dump;
pub mod journal;
pub mod row_store;
pub mod transaction;

pub use cache::TableCache;
pub use connection::{Connection, ExecutionSummary, ObserverId};
pub use constraint::ConstraintChecker;
pub use dump::Dump;
pub use journal::{Journal, JournalEntry};
pub use row_store::RowStore;
pub use transaction::{Transaction, TransactionId, TransactionState};
