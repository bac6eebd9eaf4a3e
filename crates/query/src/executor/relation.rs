//! Relation and joined row types for select execution.

use crate::ast::{ColumnRef, TableRef, Tuple};
use hashbrown::HashMap;
use lumen_core::schema::Table;
use lumen_core::{Error, Result, Row, Value};
use std::rc::Rc;

/// Aliases bound so far in a select, in join order.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    slots: Vec<(String, Table)>,
    by_alias: HashMap<String, usize>,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a table under its alias and returns the slot.
    pub fn bind(&mut self, table_ref: &TableRef, table: Table) -> Result<usize> {
        if self.by_alias.contains_key(&table_ref.alias) {
            return Err(Error::invalid_query(format!(
                "alias {} is bound twice",
                table_ref.alias
            )));
        }
        let slot = self.slots.len();
        self.slots.push((table_ref.alias.clone(), table));
        self.by_alias.insert(table_ref.alias.clone(), slot);
        Ok(slot)
    }

    /// Resolves a column reference to a slot and a column position.
    pub fn resolve(&self, column: &ColumnRef) -> Result<(usize, usize)> {
        let slot = *self.by_alias.get(&column.alias).ok_or_else(|| {
            Error::invalid_query(format!("unknown alias in {}", column))
        })?;
        let table = &self.slots[slot].1;
        let index = table
            .get_column_index(&column.column)
            .ok_or_else(|| Error::column_not_found(table.name(), column.column.as_str()))?;
        Ok((slot, index))
    }

    /// Validates every column in the list.
    pub fn check<'a>(&self, columns: impl IntoIterator<Item = &'a ColumnRef>) -> Result<()> {
        for column in columns {
            self.resolve(column)?;
        }
        Ok(())
    }

    /// Number of bound aliases.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Views a joined row through this scope.
    pub fn tuple<'a>(&'a self, row: &'a JoinedRow) -> BoundRow<'a> {
        BoundRow { scope: self, row }
    }

    fn lookup<'a>(&self, row: &'a JoinedRow, column: &ColumnRef) -> Option<&'a Value> {
        let (slot, index) = self.resolve(column).ok()?;
        row.get(slot, index)
    }
}

/// One row per bound alias. A slot is `None` when a left outer join found no
/// match for it.
#[derive(Clone, Debug)]
pub struct JoinedRow {
    rows: Vec<Option<Rc<Row>>>,
}

impl JoinedRow {
    /// Starts a joined row from a root row.
    pub fn root(row: Rc<Row>) -> Self {
        Self {
            rows: vec![Some(row)],
        }
    }

    /// Returns a copy extended with one more slot.
    pub fn extend(&self, row: Option<Rc<Row>>) -> Self {
        let mut rows = Vec::with_capacity(self.rows.len() + 1);
        rows.extend(self.rows.iter().cloned());
        rows.push(row);
        Self { rows }
    }

    /// Gets a value by slot and column position.
    pub fn get(&self, slot: usize, index: usize) -> Option<&Value> {
        self.rows.get(slot)?.as_ref()?.get(index)
    }

    /// Gets the row in a slot.
    pub fn row(&self, slot: usize) -> Option<&Rc<Row>> {
        self.rows.get(slot)?.as_ref()
    }
}

/// A joined row resolved through a scope.
pub struct BoundRow<'a> {
    scope: &'a Scope,
    row: &'a JoinedRow,
}

impl Tuple for BoundRow<'_> {
    fn value(&self, column: &ColumnRef) -> Option<&Value> {
        self.scope.lookup(self.row, column)
    }
}

/// Intermediate result of a select.
#[derive(Clone, Debug, Default)]
pub struct Relation {
    pub scope: Scope,
    pub entries: Vec<JoinedRow>,
}

impl Relation {
    /// Scans one table as the root of a relation.
    pub fn scan(table_ref: &TableRef, table: Table, rows: Vec<Rc<Row>>) -> Result<Self> {
        let mut scope = Scope::new();
        scope.bind(table_ref, table)?;
        Ok(Self {
            scope,
            entries: rows.into_iter().map(JoinedRow::root).collect(),
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
