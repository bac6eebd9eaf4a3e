//! Row storage for Lumen.
//!
//! This module provides the `RowStore` struct which manages rows for a single
//! table, including primary key and unique index maintenance.

use crate::constraint::ConstraintChecker;
use hashbrown::HashMap;
use lumen_core::schema::Table;
use lumen_core::{Error, Result, Row, RowId, Value};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Unique index over one column. Null values are not indexed.
struct UniqueIndex {
    column: usize,
    keys: HashMap<Value, RowId>,
}

impl UniqueIndex {
    fn new(column: usize) -> Self {
        Self {
            column,
            keys: HashMap::new(),
        }
    }

    fn key<'a>(&self, row: &'a Row) -> Option<&'a Value> {
        row.get(self.column).filter(|v| !v.is_null())
    }

    fn conflicts(&self, row: &Row, own: Option<RowId>) -> Option<Value> {
        let key = self.key(row)?;
        match self.keys.get(key) {
            Some(id) if Some(*id) != own => Some(key.clone()),
            _ => None,
        }
    }

    fn add(&mut self, row: &Row) {
        if let Some(key) = self.key(row) {
            self.keys.insert(key.clone(), row.id());
        }
    }

    fn remove(&mut self, row: &Row) {
        if let Some(key) = self.key(row) {
            if self.keys.get(key) == Some(&row.id()) {
                self.keys.remove(key);
            }
        }
    }
}

/// Rows of one table in insertion order.
///
/// Row ids come from a per-store counter, so iterating the id-ordered map
/// yields rows in insertion order. The primary key column is one of the
/// unique indices.
pub struct RowStore {
    schema: Table,
    rows: BTreeMap<RowId, Rc<Row>>,
    primary_index: UniqueIndex,
    unique_indices: Vec<(String, UniqueIndex)>,
    next_id: RowId,
}

impl RowStore {
    /// Creates a new row store for the given table schema.
    pub fn new(schema: Table) -> Self {
        let primary_index = UniqueIndex::new(schema.primary_key_index());
        let unique_indices = schema
            .columns()
            .iter()
            .filter(|c| c.is_unique() && c.name() != schema.primary_key())
            .map(|c| (c.name().to_string(), UniqueIndex::new(c.index())))
            .collect();
        Self {
            schema,
            rows: BTreeMap::new(),
            primary_index,
            unique_indices,
            next_id: 1,
        }
    }

    /// Returns the table schema.
    pub fn schema(&self) -> &Table {
        &self.schema
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reserves the id for the next inserted row.
    pub fn next_row_id(&mut self) -> RowId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_unique(&self, row: &Row, own: Option<RowId>) -> Result<()> {
        if let Some(value) = self.primary_index.conflicts(row, own) {
            return Err(Error::unique_constraint(
                self.schema.name(),
                self.schema.primary_key(),
                value,
            ));
        }
        for (column, index) in &self.unique_indices {
            if let Some(value) = index.conflicts(row, own) {
                return Err(Error::unique_constraint(self.schema.name(), column.as_str(), value));
            }
        }
        Ok(())
    }

    /// Inserts a row into the store.
    pub fn insert(&mut self, row: Row) -> Result<RowId> {
        let row_id = row.id();
        if self.rows.contains_key(&row_id) {
            return Err(Error::invalid_operation("Row ID already exists"));
        }
        ConstraintChecker::check_row(&self.schema, &row)?;
        self.check_unique(&row, None)?;

        self.primary_index.add(&row);
        for (_, index) in &mut self.unique_indices {
            index.add(&row);
        }
        self.next_id = self.next_id.max(row_id + 1);
        self.rows.insert(row_id, Rc::new(row));
        Ok(row_id)
    }

    /// Replaces a row, keeping its id and position.
    pub fn update(&mut self, row_id: RowId, new_row: Row) -> Result<Rc<Row>> {
        let old_row = self
            .rows
            .get(&row_id)
            .cloned()
            .ok_or_else(|| Error::invalid_operation(format!("Row {} not found in {}", row_id, self.schema.name())))?;
        ConstraintChecker::check_row(&self.schema, &new_row)?;
        self.check_unique(&new_row, Some(row_id))?;

        self.primary_index.remove(&old_row);
        self.primary_index.add(&new_row);
        for (_, index) in &mut self.unique_indices {
            index.remove(&old_row);
            index.add(&new_row);
        }
        self.rows.insert(row_id, Rc::new(new_row));
        Ok(old_row)
    }

    /// Deletes a row from the store.
    pub fn delete(&mut self, row_id: RowId) -> Result<Rc<Row>> {
        let row = self
            .rows
            .remove(&row_id)
            .ok_or_else(|| Error::invalid_operation(format!("Row {} not found in {}", row_id, self.schema.name())))?;
        self.primary_index.remove(&row);
        for (_, index) in &mut self.unique_indices {
            index.remove(&row);
        }
        Ok(row)
    }

    /// Gets a row by ID.
    pub fn get(&self, row_id: RowId) -> Option<Rc<Row>> {
        self.rows.get(&row_id).cloned()
    }

    /// Returns an iterator over all rows in insertion order.
    pub fn scan(&self) -> impl Iterator<Item = Rc<Row>> + '_ {
        self.rows.values().cloned()
    }

    /// Returns all row IDs.
    pub fn row_ids(&self) -> Vec<RowId> {
        self.rows.keys().copied().collect()
    }

    /// Finds the row holding a primary key value.
    pub fn get_by_pk(&self, pk_value: &Value) -> Option<Rc<Row>> {
        let id = self.primary_index.keys.get(pk_value)?;
        self.get(*id)
    }

    /// Whether a primary key value is present.
    pub fn pk_exists(&self, pk_value: &Value) -> bool {
        self.primary_index.keys.contains_key(pk_value)
    }

    /// Returns the primary key value of a row.
    pub fn extract_pk(&self, row: &Row) -> Option<Value> {
        row.get(self.schema.primary_key_index()).cloned()
    }

    /// Inserts a row or replaces the row with the same primary key.
    ///
    /// Returns the id of the stored row and the replaced row, if any. A
    /// replaced row keeps its id.
    pub fn insert_or_replace(&mut self, values: Vec<Value>) -> Result<(RowId, Option<Rc<Row>>)> {
        let pk = values.get(self.schema.primary_key_index()).cloned().unwrap_or(Value::Null);
        match self.get_by_pk(&pk) {
            Some(existing) => {
                let old = self.update(existing.id(), Row::new(existing.id(), values))?;
                Ok((existing.id(), Some(old)))
            }
            None => {
                let id = self.next_row_id();
                self.insert(Row::new(id, values))?;
                Ok((id, None))
            }
        }
    }

    /// Removes every row.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.primary_index.keys.clear();
        for (_, index) in &mut self.unique_indices {
            index.keys.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::schema::{Column, TableBuilder};
    use lumen_core::DataType;

    fn schema() -> Table {
        TableBuilder::new("users")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add(Column::new("email", DataType::String).unique(true).nullable(true))
            .unwrap()
            .add_primary_key("id")
            .unwrap()
            .build()
            .unwrap()
    }

    fn row(store: &mut RowStore, id: i64, email: Option<&str>) -> Row {
        Row::new(store.next_row_id(), vec![Value::Int64(id), Value::from(email)])
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut store = RowStore::new(schema());
        let r = row(&mut store, 1, Some("a@x"));
        store.insert(r).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.pk_exists(&Value::Int64(1)));
        assert!(store.pk_exists(&Value::Float64(1.0)));
        assert_eq!(store.get_by_pk(&Value::Int64(1)).unwrap().get(1), Some(&Value::from("a@x")));
    }

    #[test]
    fn test_duplicate_primary_key() {
        let mut store = RowStore::new(schema());
        let a = row(&mut store, 1, None);
        let b = row(&mut store, 1, None);
        store.insert(a).unwrap();
        match store.insert(b) {
            Err(Error::UniqueConstraint { column, .. }) => assert_eq!(column, "id"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unique_column_ignores_nulls() {
        let mut store = RowStore::new(schema());
        for id in 0..3 {
            let r = row(&mut store, id, None);
            store.insert(r).unwrap();
        }
        let a = row(&mut store, 10, Some("same"));
        let b = row(&mut store, 11, Some("same"));
        store.insert(a).unwrap();
        assert!(store.insert(b).is_err());
    }

    #[test]
    fn test_update_keeps_position() {
        let mut store = RowStore::new(schema());
        let a = row(&mut store, 1, None);
        let b = row(&mut store, 2, None);
        let a_id = store.insert(a).unwrap();
        store.insert(b).unwrap();
        store
            .update(a_id, Row::new(a_id, vec![Value::Int64(1), Value::from("new")]))
            .unwrap();
        let emails: Vec<_> = store.scan().map(|r| r.get(1).cloned().unwrap()).collect();
        assert_eq!(emails, vec![Value::from("new"), Value::Null]);
    }

    #[test]
    fn test_insert_or_replace() {
        let mut store = RowStore::new(schema());
        let (id, old) = store
            .insert_or_replace(vec![Value::Int64(1), Value::from("a")])
            .unwrap();
        assert!(old.is_none());
        let (same, old) = store
            .insert_or_replace(vec![Value::Int64(1), Value::from("b")])
            .unwrap();
        assert_eq!(id, same);
        assert_eq!(old.unwrap().get(1), Some(&Value::from("a")));
        assert_eq!(store.get(id).unwrap().get(1), Some(&Value::from("b")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete() {
        let mut store = RowStore::new(schema());
        let a = row(&mut store, 1, Some("a"));
        let id = store.insert(a).unwrap();
        store.delete(id).unwrap();
        assert!(!store.pk_exists(&Value::Int64(1)));
        assert!(store.delete(id).is_err());
        let again = row(&mut store, 1, Some("a"));
        assert!(store.insert(again).is_ok());
    }
}
