//! Journal for tracking changes in Lumen storage.
//!
//! This module provides the `Journal` struct for recording the changes a
//! transaction applies, so they can be reported on commit or undone on
//! rollback.

use crate::cache::TableCache;
use lumen_core::{Result, Row, RowId};
use lumen_reactive::ChangeSet;

/// A single journal entry representing a change.
#[derive(Clone, Debug)]
pub enum JournalEntry {
    /// A row was inserted.
    Insert { table: String, row_id: RowId },
    /// A row was updated.
    Update {
        table: String,
        row_id: RowId,
        old: Row,
    },
    /// A row was deleted.
    Delete { table: String, row: Row },
}

impl JournalEntry {
    /// Returns the table name for this entry.
    pub fn table(&self) -> &str {
        match self {
            JournalEntry::Insert { table, .. } => table,
            JournalEntry::Update { table, .. } => table,
            JournalEntry::Delete { table, .. } => table,
        }
    }

    /// Returns the row ID for this entry.
    pub fn row_id(&self) -> RowId {
        match self {
            JournalEntry::Insert { row_id, .. } => *row_id,
            JournalEntry::Update { row_id, .. } => *row_id,
            JournalEntry::Delete { row, .. } => row.id(),
        }
    }
}

/// Journal for tracking changes within a transaction.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    /// Creates a new empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an insert.
    pub fn record_insert(&mut self, table: &str, row_id: RowId) {
        self.entries.push(JournalEntry::Insert {
            table: table.to_string(),
            row_id,
        });
    }

    /// Records an update with the row it replaced.
    pub fn record_update(&mut self, table: &str, row_id: RowId, old: Row) {
        self.entries.push(JournalEntry::Update {
            table: table.to_string(),
            row_id,
            old,
        });
    }

    /// Records a delete with the removed row.
    pub fn record_delete(&mut self, table: &str, row: Row) {
        self.entries.push(JournalEntry::Delete {
            table: table.to_string(),
            row,
        });
    }

    /// Returns all entries in order.
    pub fn get_entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The tables written so far.
    pub fn change_set(&self) -> ChangeSet {
        self.entries.iter().map(JournalEntry::table).collect()
    }

    /// Finalizes the journal. Changes are already applied.
    pub fn commit(&mut self) -> Vec<JournalEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Undoes every recorded change, newest first.
    pub fn rollback(&mut self, cache: &mut TableCache) -> Result<()> {
        for entry in self.entries.drain(..).rev() {
            let store = match cache.get_table_mut(entry.table()) {
                Some(store) => store,
                None => continue,
            };
            match entry {
                JournalEntry::Insert { row_id, .. } => {
                    store.delete(row_id)?;
                }
                JournalEntry::Update { row_id, old, .. } => {
                    store.update(row_id, old)?;
                }
                JournalEntry::Delete { row, .. } => {
                    store.insert(row)?;
                }
            }
        }
        Ok(())
    }
}
