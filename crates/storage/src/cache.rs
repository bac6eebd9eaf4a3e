//! Cache management for Lumen storage.
//!
//! This module provides the `TableCache` struct which manages multiple table
//! stores and serves them to the select executor.

use crate::row_store::RowStore;
use lumen_core::schema::Table;
use lumen_core::{Error, Result, Row};
use lumen_query::executor::DataSource;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Cache for managing multiple table stores.
#[derive(Default)]
pub struct TableCache {
    /// Table name → RowStore mapping.
    tables: BTreeMap<String, RowStore>,
}

impl TableCache {
    /// Creates a new empty table cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table in the cache.
    pub fn create_table(&mut self, schema: Table) -> Result<()> {
        let name = schema.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(Error::invalid_schema(format!("Table already exists: {}", name)));
        }
        self.tables.insert(name, RowStore::new(schema));
        Ok(())
    }

    /// Gets a reference to a table store.
    pub fn get_table(&self, name: &str) -> Option<&RowStore> {
        self.tables.get(name)
    }

    /// Gets a mutable reference to a table store.
    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut RowStore> {
        self.tables.get_mut(name)
    }

    /// Returns the number of tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Returns all table names in name order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Iterates the stores in table name order.
    pub fn stores(&self) -> impl Iterator<Item = &RowStore> {
        self.tables.values()
    }

    /// Returns the total number of rows across all tables.
    pub fn total_row_count(&self) -> usize {
        self.tables.values().map(RowStore::len).sum()
    }
}

impl DataSource for TableCache {
    fn schema(&self, table: &str) -> Result<&Table> {
        self.get_table(table)
            .map(RowStore::schema)
            .ok_or_else(|| Error::table_not_found(table))
    }

    fn scan(&self, table: &str) -> Result<Vec<Rc<Row>>> {
        self.get_table(table)
            .map(|store| store.scan().collect())
            .ok_or_else(|| Error::table_not_found(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::schema::TableBuilder;
    use lumen_core::{DataType, Value};

    fn table(name: &str) -> Table {
        TableBuilder::new(name)
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_primary_key("id")
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_tables() {
        let mut cache = TableCache::new();
        cache.create_table(table("b")).unwrap();
        cache.create_table(table("a")).unwrap();
        assert!(cache.create_table(table("a")).is_err());
        assert_eq!(cache.table_names(), vec!["a", "b"]);
        assert_eq!(cache.table_count(), 2);
    }

    #[test]
    fn test_data_source() {
        let mut cache = TableCache::new();
        cache.create_table(table("a")).unwrap();
        cache
            .get_table_mut("a")
            .unwrap()
            .insert(Row::new(1, vec![Value::Int64(7)]))
            .unwrap();
        assert_eq!(cache.scan("a").unwrap().len(), 1);
        assert_eq!(cache.total_row_count(), 1);
        assert!(matches!(cache.schema("x"), Err(Error::TableNotFound { .. })));
    }
}
