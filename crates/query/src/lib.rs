//! Lumen Query - Statement AST and select executor.
//!
//! This crate provides the statement layer of the relational engine that the
//! Lumen mapping layer compiles into:
//!
//! - `ast`: Column references, the predicate algebra and the
//!   select/insert/update/delete statements
//! - `executor`: Select execution (scan, left outer join, filter, sort,
//!   project, distinct, skip/limit) over any `DataSource`
//!
//! # Example
//!
//! ```rust
//! use lumen_query::ast::{ColumnRef, Predicate, SelectStatement, TableRef};
//! use lumen_core::Value;
//!
//! let stmt = SelectStatement::new(TableRef::new("post", "post@0"))
//!     .column(ColumnRef::new("post@0", "_id"))
//!     .filter(Predicate::eq(ColumnRef::new("post@0", "title"), Value::from("hello")));
//!
//! assert_eq!(
//!     stmt.to_string(),
//!     "SELECT post@0._id FROM post AS post@0 WHERE post@0.title = \"hello\""
//! );
//! ```

pub mod ast;
pub mod executor;
