//! Lumen Database - Relational object mapping and reactive queries.
//!
//! This crate maps nested JSON entity graphs onto the Lumen engine:
//!
//! - `Database`: Schema declaration, writes, reads, transactions and
//!   dump/load
//! - `SchemaDef`, `ColumnDef`, `RelationshipDef`: Table declarations with
//!   relationships expressed as join predicates
//! - `Clause`: Filter trees compiled into engine predicates
//! - `QueryToken`, `Selector`: Lazily compiled reads that can be fetched
//!   once or observed, mapped, combined and concatenated
//! - `TransactionContext`: Buffered writes committed as one batch
//!
//! # Example
//!
//! ```rust
//! use lumen_database::{
//!     Clause, ColumnDef, ColumnType, Database, DatabaseConfig, Query, RelationshipDef, SchemaDef,
//! };
//! use serde_json::json;
//!
//! let db = Database::new(DatabaseConfig::new("blog"));
//! db.define_schema(
//!     "post",
//!     SchemaDef::new()
//!         .column("_id", ColumnDef::new(ColumnType::String).primary_key())
//!         .column("title", ColumnDef::new(ColumnType::String))
//!         .column("ownerId", ColumnDef::new(ColumnType::String))
//!         .relationship(
//!             "owner",
//!             RelationshipDef::one_to_one("user", |user| {
//!                 Ok(Clause::object([("ownerId", user.column("_id")?)]))
//!             }),
//!         ),
//! )
//! .unwrap();
//! db.define_schema(
//!     "user",
//!     SchemaDef::new()
//!         .column("_id", ColumnDef::new(ColumnType::String).primary_key())
//!         .column("name", ColumnDef::new(ColumnType::String)),
//! )
//! .unwrap();
//! db.connect().unwrap();
//!
//! db.insert(
//!     "post",
//!     &json!({ "_id": "p1", "title": "hello", "ownerId": "u1",
//!              "owner": { "_id": "u1", "name": "ann" } }),
//!     None,
//! )
//! .unwrap();
//!
//! let posts = db
//!     .get("post", Query::new().filter(json!({ "title": "hello" })))
//!     .values()
//!     .unwrap();
//! assert_eq!(posts[0]["owner"]["name"], json!("ann"));
//! ```

pub mod alias;
pub mod clause;
pub mod codec;
pub mod config;
pub mod database;
pub mod existence;
pub mod hydrate;
pub mod join;
pub mod mutation;
pub mod predicate;
pub mod schema;
pub mod selector;
pub mod token;
pub mod transaction;

pub use clause::{Clause, ColumnHandle};
pub use config::DatabaseConfig;
pub use database::{Database, DisposeScope, ExecutorResult, Query};
pub use existence::Identifier;
pub use join::{Field, JoinMode};
pub use lumen_core::{Error, Result};
pub use lumen_query::ast::SortOrder;
pub use predicate::CompileWarning;
pub use schema::{ColumnDef, ColumnType, Relationship, RelationshipDef, SchemaDef, TableHandle};
pub use selector::{MapFn, Selector};
pub use token::QueryToken;
pub use transaction::TransactionContext;
