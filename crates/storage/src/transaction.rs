//! Transaction management for Lumen storage.
//!
//! Writes apply to the cache immediately and are journaled, so a failed
//! batch can be undone in reverse order.

use crate::cache::TableCache;
use crate::journal::{Journal, JournalEntry};
use core::sync::atomic::{AtomicU64, Ordering};
use lumen_core::{Error, Result, Row, RowId, Value};
use std::rc::Rc;

/// Global transaction ID counter.
static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

/// Transaction ID type.
pub type TransactionId = u64;

/// Transaction state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// A storage transaction.
pub struct Transaction {
    id: TransactionId,
    journal: Journal,
    state: TransactionState,
}

impl Transaction {
    /// Creates a new transaction.
    pub fn begin() -> Self {
        Self {
            id: NEXT_TX_ID.fetch_add(1, Ordering::SeqCst),
            journal: Journal::new(),
            state: TransactionState::Active,
        }
    }

    /// Returns the transaction ID.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true if the transaction is active.
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    fn check_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::invalid_operation("Transaction is not active"));
        }
        Ok(())
    }

    /// Inserts a new row built from column values.
    pub fn insert(&mut self, cache: &mut TableCache, table: &str, values: Vec<Value>) -> Result<RowId> {
        self.check_active()?;
        let store = cache.get_table_mut(table).ok_or_else(|| Error::table_not_found(table))?;
        let row_id = store.next_row_id();
        store.insert(Row::new(row_id, values))?;
        self.journal.record_insert(table, row_id);
        Ok(row_id)
    }

    /// Inserts a row or replaces the row with the same primary key.
    ///
    /// Returns true if an existing row was replaced.
    pub fn insert_or_replace(
        &mut self,
        cache: &mut TableCache,
        table: &str,
        values: Vec<Value>,
    ) -> Result<bool> {
        self.check_active()?;
        let store = cache.get_table_mut(table).ok_or_else(|| Error::table_not_found(table))?;
        match store.insert_or_replace(values)? {
            (row_id, Some(old)) => {
                self.journal.record_update(table, row_id, (*old).clone());
                Ok(true)
            }
            (row_id, None) => {
                self.journal.record_insert(table, row_id);
                Ok(false)
            }
        }
    }

    /// Replaces the values of a row.
    pub fn update(
        &mut self,
        cache: &mut TableCache,
        table: &str,
        row_id: RowId,
        values: Vec<Value>,
    ) -> Result<()> {
        self.check_active()?;
        let store = cache.get_table_mut(table).ok_or_else(|| Error::table_not_found(table))?;
        let old = store.update(row_id, Row::new(row_id, values))?;
        self.journal.record_update(table, row_id, (*old).clone());
        Ok(())
    }

    /// Deletes a row.
    pub fn delete(&mut self, cache: &mut TableCache, table: &str, row_id: RowId) -> Result<Rc<Row>> {
        self.check_active()?;
        let store = cache.get_table_mut(table).ok_or_else(|| Error::table_not_found(table))?;
        let row = store.delete(row_id)?;
        self.journal.record_delete(table, (*row).clone());
        Ok(row)
    }

    /// Commits the transaction.
    pub fn commit(mut self) -> Result<Vec<JournalEntry>> {
        self.check_active()?;
        self.state = TransactionState::Committed;
        Ok(self.journal.commit())
    }

    /// Rolls back the transaction.
    pub fn rollback(mut self, cache: &mut TableCache) -> Result<()> {
        self.check_active()?;
        self.state = TransactionState::RolledBack;
        self.journal.rollback(cache)
    }

    /// Returns the journal entries recorded so far.
    pub fn get_changes(&self) -> &[JournalEntry] {
        self.journal.get_entries()
    }
}
