//! Schema module for Lumen.
//!
//! Engine-level table definitions: the physical columns a table stores, its
//! primary key, and the uniqueness and index flags the storage layer enforces.

mod column;
mod table;

pub use column::Column;
pub use table::{Table, TableBuilder};
