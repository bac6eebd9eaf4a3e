//! Select runner.

use crate::ast::{ColumnRef, Predicate, SelectStatement, TableRef};
use crate::executor::{
    DataSource, LimitExecutor, NestedLoopJoin, ProjectExecutor, Relation, SortExecutor,
};
use lumen_core::{Result, Row, Value};
use std::rc::Rc;

/// Rows of a select, one value per projected column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnRef>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Position of a projected column.
    pub fn column_index(&self, column: &ColumnRef) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of a projected column in one row.
    pub fn get(&self, row: usize, column: &ColumnRef) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Executes a select statement against a data source.
///
/// Every column the statement references is validated before any row is
/// read, so an unknown column fails even on empty tables.
pub fn execute_select<S: DataSource + ?Sized>(
    source: &S,
    stmt: &SelectStatement,
) -> Result<ResultSet> {
    let root = source.schema(&stmt.from.table)?.clone();
    let mut relation = Relation::scan(&stmt.from, root, source.scan(&stmt.from.table)?)?;

    for join in &stmt.joins {
        let table = source.schema(&join.table.table)?.clone();
        let rows = source.scan(&join.table.table)?;
        relation = NestedLoopJoin::new(join.on.clone()).execute(relation, &join.table, table, rows)?;
    }

    relation.scope.check(&stmt.columns)?;
    relation.scope.check(stmt.order_by.iter().map(|o| &o.column))?;
    if let Some(filter) = &stmt.filter {
        relation.scope.check(filter.columns())?;
        let scope = &relation.scope;
        relation
            .entries
            .retain(|entry| filter.eval(&scope.tuple(entry)));
    }

    let relation = SortExecutor::new(stmt.order_by.clone()).execute(relation)?;
    let rows = ProjectExecutor::new(stmt.columns.clone(), stmt.distinct).execute(&relation)?;
    let rows = LimitExecutor::new(stmt.limit, stmt.skip).execute(rows);

    Ok(ResultSet {
        columns: stmt.columns.clone(),
        rows,
    })
}

/// Returns the rows of one table matching a filter. Column references use
/// the table name as alias.
pub fn filter_rows<S: DataSource + ?Sized>(
    source: &S,
    table: &str,
    filter: Option<&Predicate>,
) -> Result<Vec<Rc<Row>>> {
    let schema = source.schema(table)?.clone();
    let rows = source.scan(table)?;
    let relation = Relation::scan(&TableRef::bare(table), schema, rows)?;
    let filter = match filter {
        Some(filter) => filter,
        None => return Ok(relation.entries.iter().filter_map(|e| e.row(0).cloned()).collect()),
    };
    relation.scope.check(filter.columns())?;
    Ok(relation
        .entries
        .iter()
        .filter(|entry| filter.eval(&relation.scope.tuple(entry)))
        .filter_map(|entry| entry.row(0).cloned())
        .collect())
}
