//! Select execution over a row source.
//!
//! A select runs as a fixed pipeline: scan the root table, left outer join
//! each joined table in order, filter, sort, project, deduplicate, then
//! apply the skip/limit window.

mod join;
mod limit;
mod project;
mod relation;
mod runner;
mod sort;

pub use join::NestedLoopJoin;
pub use limit::LimitExecutor;
pub use project::ProjectExecutor;
pub use relation::{JoinedRow, Relation, Scope};
pub use runner::{execute_select, filter_rows, ResultSet};
pub use sort::SortExecutor;

use lumen_core::schema::Table;
use lumen_core::{Result, Row};
use std::rc::Rc;

/// Source of table schemas and rows for execution.
pub trait DataSource {
    /// Returns the schema of a table.
    fn schema(&self, table: &str) -> Result<&Table>;

    /// Returns all rows of a table in insertion order.
    fn scan(&self, table: &str) -> Result<Vec<Rc<Row>>>;
}
