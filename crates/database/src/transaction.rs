//! Buffered transactions.

use crate::database::{Database, ExecutorResult};
use crate::existence::CacheRollback;
use lumen_core::{Error, Result};
use lumen_query::ast::Statement;
use std::cell::RefCell;

#[derive(Default)]
struct Buffer {
    statements: Vec<Statement>,
    rollback: CacheRollback,
    closed: bool,
}

impl Buffer {
    fn close(&mut self) -> (Vec<Statement>, CacheRollback) {
        self.closed = true;
        (
            std::mem::take(&mut self.statements),
            std::mem::take(&mut self.rollback),
        )
    }
}

/// Collects writes and submits them as one engine transaction.
///
/// Writes passed a context update the existence cache right away but reach
/// the engine only on [`commit`](Self::commit). If the commit fails, or the
/// context is aborted or dropped uncommitted, the buffered cache updates
/// are undone.
pub struct TransactionContext {
    database: Database,
    buffer: RefCell<Buffer>,
}

impl TransactionContext {
    pub(crate) fn new(database: Database) -> Self {
        Self {
            database,
            buffer: RefCell::new(Buffer::default()),
        }
    }

    pub(crate) fn enqueue(&self, statements: Vec<Statement>, rollback: CacheRollback) -> Result<()> {
        let mut buffer = self.buffer.borrow_mut();
        if buffer.closed {
            drop(buffer);
            self.database.undo(rollback);
            return Err(Error::invalid_operation("transaction is already closed"));
        }
        buffer.statements.extend(statements);
        buffer.rollback.merge(rollback);
        Ok(())
    }

    /// A copy of the buffered statements, in order.
    pub(crate) fn pending(&self) -> Vec<Statement> {
        self.buffer.borrow().statements.clone()
    }

    /// Number of buffered statements.
    pub fn len(&self) -> usize {
        self.buffer.borrow().statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.borrow().statements.is_empty()
    }

    /// Submits every buffered statement as one transaction.
    pub fn commit(self) -> Result<ExecutorResult> {
        let (statements, rollback) = self.buffer.borrow_mut().close();
        log::debug!("committing {} buffered statement(s)", statements.len());
        self.database.submit(statements, rollback)
    }

    /// Discards the buffer.
    pub fn abort(self) {
        self.discard();
    }

    fn discard(&self) {
        let (statements, rollback) = self.buffer.borrow_mut().close();
        if !statements.is_empty() || !rollback.is_empty() {
            log::debug!("discarding {} buffered statement(s)", statements.len());
        }
        self.database.undo(rollback);
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if !self.buffer.borrow().closed {
            self.discard();
        }
    }
}
