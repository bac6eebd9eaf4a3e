//! Shared connection to the in-memory engine.
//!
//! A `Connection` owns the table cache, the observer registry and the
//! scheduler observers refresh through. Clones share all three.

use crate::cache::TableCache;
use crate::dump::{Dump, DumpRow};
use crate::transaction::Transaction;
use lumen_core::schema::Table;
use lumen_core::{Error, Result, Value};
use lumen_query::ast::{DeleteStatement, InsertStatement, SelectStatement, Statement};
use lumen_query::executor::{execute_select, filter_rows, DataSource, ResultSet};
use lumen_reactive::{ChangeSet, QueryId, QueryRegistry, Scheduler};
use std::cell::RefCell;
use std::rc::Rc;

/// Identifier of a registered observer.
pub type ObserverId = QueryId;

/// Row counts written by one statement batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

struct Inner {
    cache: RefCell<TableCache>,
    registry: RefCell<QueryRegistry>,
    scheduler: Rc<Scheduler>,
}

/// Shared handle to the engine.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<Inner>,
}

impl Connection {
    /// Opens an empty engine with the given tables.
    pub fn open(tables: Vec<Table>) -> Result<Self> {
        Self::with_scheduler(tables, Rc::new(Scheduler::new()))
    }

    /// Opens an engine whose observers refresh through `scheduler`.
    pub fn with_scheduler(tables: Vec<Table>, scheduler: Rc<Scheduler>) -> Result<Self> {
        let mut cache = TableCache::new();
        for table in tables {
            cache.create_table(table)?;
        }
        log::debug!("opened engine with {} table(s)", cache.table_count());
        Ok(Self {
            inner: Rc::new(Inner {
                cache: RefCell::new(cache),
                registry: RefCell::new(QueryRegistry::new()),
                scheduler,
            }),
        })
    }

    /// The scheduler observers refresh through.
    pub fn scheduler(&self) -> Rc<Scheduler> {
        self.inner.scheduler.clone()
    }

    /// Returns the schema of a table.
    pub fn schema(&self, table: &str) -> Result<Table> {
        self.inner.cache.borrow().schema(table).cloned()
    }

    /// Returns every table name in name order.
    pub fn table_names(&self) -> Vec<String> {
        self.inner
            .cache
            .borrow()
            .table_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Number of rows in a table, zero if it does not exist.
    pub fn row_count(&self, table: &str) -> usize {
        self.inner
            .cache
            .borrow()
            .get_table(table)
            .map_or(0, |store| store.len())
    }

    /// Whether every table is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.cache.borrow().total_row_count() == 0
    }

    /// Runs a select.
    pub fn select(&self, stmt: &SelectStatement) -> Result<ResultSet> {
        execute_select(&*self.inner.cache.borrow(), stmt)
    }

    /// Executes statements as one transaction.
    ///
    /// On failure every applied change is undone and no observer runs. On
    /// success, observers of the written tables run once each, inside one
    /// scheduler batch, after the cache is released.
    pub fn execute(&self, statements: Vec<Statement>) -> Result<ExecutionSummary> {
        let (summary, changes) = {
            let mut cache = self.inner.cache.borrow_mut();
            let mut tx = Transaction::begin();
            let mut summary = ExecutionSummary::default();
            for stmt in &statements {
                if let Err(error) = apply(&mut tx, &mut cache, stmt, &mut summary) {
                    log::debug!("transaction {} failed on `{}`: {}", tx.id(), stmt, error);
                    tx.rollback(&mut cache)?;
                    return Err(error);
                }
            }
            let entries = tx.commit()?;
            let changes: ChangeSet = entries.iter().map(|e| e.table()).collect();
            (summary, changes)
        };
        log::debug!(
            "committed {} statement(s): {} inserted, {} updated, {} deleted",
            statements.len(),
            summary.inserted,
            summary.updated,
            summary.deleted
        );
        self.notify(&changes);
        Ok(summary)
    }

    /// Runs a select as if `pending` had been executed first, then undoes
    /// `pending`. Observers are not notified.
    pub fn preview(&self, pending: &[Statement], stmt: &SelectStatement) -> Result<ResultSet> {
        let mut cache = self.inner.cache.borrow_mut();
        let mut tx = Transaction::begin();
        let mut summary = ExecutionSummary::default();
        for pending_stmt in pending {
            if let Err(error) = apply(&mut tx, &mut cache, pending_stmt, &mut summary) {
                tx.rollback(&mut cache)?;
                return Err(error);
            }
        }
        let result = execute_select(&*cache, stmt);
        tx.rollback(&mut cache)?;
        result
    }

    fn notify(&self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        let affected = self.inner.registry.borrow().affected(changes);
        self.inner.scheduler.batch(|| {
            for (_, callback) in affected {
                callback(changes);
            }
        });
    }

    /// Calls `listener` after every commit that writes a table `stmt` reads.
    pub fn observe<F>(&self, stmt: &SelectStatement, listener: F) -> ObserverId
    where
        F: Fn() + 'static,
    {
        let tables = stmt.tables();
        self.inner
            .registry
            .borrow_mut()
            .register(&tables, move |_| listener())
    }

    /// Removes an observer. Returns false if it was already removed.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.inner.registry.borrow_mut().unregister(id)
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.inner.registry.borrow().query_count()
    }

    /// Snapshots every table.
    pub fn dump(&self) -> Dump {
        let cache = self.inner.cache.borrow();
        let mut dump = Dump::default();
        for store in cache.stores() {
            let schema = store.schema();
            let rows = store
                .scan()
                .map(|row| {
                    schema
                        .columns()
                        .iter()
                        .zip(row.values())
                        .map(|(column, value)| (column.name().to_string(), value.clone()))
                        .collect::<DumpRow>()
                })
                .collect();
            dump.tables.insert(schema.name().to_string(), rows);
        }
        dump
    }

    /// Deletes every row of every table as one transaction. Returns the
    /// number of rows deleted.
    pub fn clear(&self) -> Result<usize> {
        let statements = self
            .table_names()
            .into_iter()
            .map(|table| Statement::Delete(DeleteStatement { table, filter: None }))
            .collect();
        Ok(self.execute(statements)?.deleted)
    }

    /// Loads a snapshot into an empty engine as one transaction. Returns the
    /// number of rows loaded.
    pub fn load(&self, dump: &Dump) -> Result<usize> {
        if !self.is_empty() {
            return Err(Error::invalid_operation(
                "cannot load a dump into a database that already holds rows",
            ));
        }
        let statements = dump
            .tables
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(table, rows)| {
                Statement::Insert(InsertStatement {
                    table: table.clone(),
                    rows: rows
                        .iter()
                        .map(|row| row.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                        .collect(),
                    replace: false,
                })
            })
            .collect();
        Ok(self.execute(statements)?.inserted)
    }
}

fn build_values(schema: &Table, pairs: &[(String, Value)]) -> Result<Vec<Value>> {
    let mut values: Vec<Value> = schema.columns().iter().map(|c| c.default_value()).collect();
    for (column, value) in pairs {
        let index = schema
            .get_column_index(column)
            .ok_or_else(|| Error::column_not_found(schema.name(), column.as_str()))?;
        values[index] = value.clone();
    }
    Ok(values)
}

fn apply(
    tx: &mut Transaction,
    cache: &mut TableCache,
    stmt: &Statement,
    summary: &mut ExecutionSummary,
) -> Result<()> {
    let schema = cache.schema(stmt.table())?.clone();
    match stmt {
        Statement::Insert(insert) => {
            for pairs in &insert.rows {
                let values = build_values(&schema, pairs)?;
                if insert.replace {
                    if tx.insert_or_replace(cache, &insert.table, values)? {
                        summary.updated += 1;
                    } else {
                        summary.inserted += 1;
                    }
                } else {
                    tx.insert(cache, &insert.table, values)?;
                    summary.inserted += 1;
                }
            }
        }
        Statement::Update(update) => {
            let targets = update
                .set
                .iter()
                .map(|(column, value)| {
                    schema
                        .get_column_index(column)
                        .map(|index| (index, value.clone()))
                        .ok_or_else(|| Error::column_not_found(schema.name(), column.as_str()))
                })
                .collect::<Result<Vec<_>>>()?;
            let rows = filter_rows(&*cache, &update.table, update.filter.as_ref())?;
            for row in rows {
                tx.update(cache, &update.table, row.id(), row.patched(&targets))?;
                summary.updated += 1;
            }
        }
        Statement::Delete(delete) => {
            let rows = filter_rows(&*cache, &delete.table, delete.filter.as_ref())?;
            for row in rows {
                tx.delete(cache, &delete.table, row.id())?;
                summary.deleted += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::schema::TableBuilder;
    use lumen_core::DataType;
    use lumen_query::ast::{ColumnRef, DeleteStatement, Predicate, TableRef, UpdateStatement};
    use std::cell::Cell;

    fn connection() -> Connection {
        let user = TableBuilder::new("user")
            .unwrap()
            .add_column("_id", DataType::String)
            .unwrap()
            .add_column("name", DataType::String)
            .unwrap()
            .add_primary_key("_id")
            .unwrap()
            .add_nullable(&["name"])
            .build()
            .unwrap();
        let tag = TableBuilder::new("tag")
            .unwrap()
            .add_column("_id", DataType::String)
            .unwrap()
            .add_primary_key("_id")
            .unwrap()
            .build()
            .unwrap();
        Connection::open(vec![user, tag]).unwrap()
    }

    fn insert(table: &str, id: &str, replace: bool) -> Statement {
        Statement::Insert(InsertStatement {
            table: table.into(),
            rows: vec![vec![("_id".into(), Value::from(id))]],
            replace,
        })
    }

    fn users() -> SelectStatement {
        SelectStatement::new(TableRef::bare("user"))
            .column(ColumnRef::new("user", "_id"))
            .column(ColumnRef::new("user", "name"))
    }

    #[test]
    fn test_missing_columns_take_defaults() {
        let conn = connection();
        conn.execute(vec![insert("user", "u1", false)]).unwrap();
        let result = conn.select(&users()).unwrap();
        assert_eq!(result.rows, vec![vec![Value::from("u1"), Value::Null]]);
    }

    #[test]
    fn test_strict_insert_conflict_rolls_back_batch() {
        let conn = connection();
        conn.execute(vec![insert("user", "u1", false)]).unwrap();
        let result = conn.execute(vec![insert("user", "u2", false), insert("user", "u1", false)]);
        assert!(matches!(result, Err(Error::UniqueConstraint { .. })));
        assert_eq!(conn.row_count("user"), 1);
    }

    #[test]
    fn test_replace_overwrites() {
        let conn = connection();
        conn.execute(vec![insert("user", "u1", false)]).unwrap();
        let summary = conn.execute(vec![insert("user", "u1", true)]).unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(conn.row_count("user"), 1);
    }

    #[test]
    fn test_update_and_delete() {
        let conn = connection();
        conn.execute(vec![insert("user", "u1", false), insert("user", "u2", false)])
            .unwrap();
        let filter = Some(Predicate::eq(ColumnRef::new("user", "_id"), "u1"));
        let summary = conn
            .execute(vec![
                Statement::Update(UpdateStatement {
                    table: "user".into(),
                    set: vec![("name".into(), Value::from("Ann"))],
                    filter: filter.clone(),
                }),
                Statement::Delete(DeleteStatement {
                    table: "user".into(),
                    filter: Some(Predicate::eq(ColumnRef::new("user", "_id"), "u2")),
                }),
            ])
            .unwrap();
        assert_eq!((summary.updated, summary.deleted), (1, 1));
        let result = conn.select(&users()).unwrap();
        assert_eq!(result.rows, vec![vec![Value::from("u1"), Value::from("Ann")]]);
    }

    #[test]
    fn test_preview_sees_pending_writes_and_leaves_no_trace() {
        let conn = connection();
        conn.execute(vec![insert("user", "u1", false)]).unwrap();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let _id = conn.observe(&users(), move || counter.set(counter.get() + 1));

        let pending = vec![
            insert("user", "u2", false),
            Statement::Delete(DeleteStatement {
                table: "user".into(),
                filter: Some(Predicate::eq(ColumnRef::new("user", "_id"), "u1")),
            }),
        ];
        let result = conn.preview(&pending, &users()).unwrap();
        assert_eq!(result.rows, vec![vec![Value::from("u2"), Value::Null]]);

        let result = conn.select(&users()).unwrap();
        assert_eq!(result.rows, vec![vec![Value::from("u1"), Value::Null]]);
        assert_eq!(hits.get(), 0);

        let failing = vec![insert("user", "u3", false), insert("user", "u1", false)];
        assert!(matches!(
            conn.preview(&failing, &users()),
            Err(Error::UniqueConstraint { .. })
        ));
        assert_eq!(conn.row_count("user"), 1);
    }

    #[test]
    fn test_update_unknown_column() {
        let conn = connection();
        let result = conn.execute(vec![Statement::Update(UpdateStatement {
            table: "user".into(),
            set: vec![("age".into(), Value::Int64(3))],
            filter: None,
        })]);
        assert!(matches!(result, Err(Error::ColumnNotFound { .. })));
    }

    #[test]
    fn test_observers_run_once_per_commit_for_touched_tables() {
        let conn = connection();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let id = conn.observe(&users(), move || counter.set(counter.get() + 1));

        conn.execute(vec![insert("user", "u1", false), insert("user", "u2", false)])
            .unwrap();
        assert_eq!(hits.get(), 1);
        conn.execute(vec![insert("tag", "t1", false)]).unwrap();
        assert_eq!(hits.get(), 1);
        let _ = conn.execute(vec![insert("user", "u1", false)]);
        assert_eq!(hits.get(), 1);

        assert_eq!(conn.observer_count(), 1);
        assert!(conn.unobserve(id));
        assert_eq!(conn.observer_count(), 0);
        conn.execute(vec![insert("user", "u3", false)]).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_observer_may_read_and_unobserve() {
        let conn = connection();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let id_cell = Rc::new(Cell::new(0));
        let (reader, out, own_id) = (conn.clone(), seen.clone(), id_cell.clone());
        let id = conn.observe(&users(), move || {
            out.borrow_mut().push(reader.select(&users()).unwrap().len());
            reader.unobserve(own_id.get());
        });
        id_cell.set(id);

        conn.execute(vec![insert("user", "u1", false)]).unwrap();
        conn.execute(vec![insert("user", "u2", false)]).unwrap();
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn test_clear_notifies_once() {
        let conn = connection();
        conn.execute(vec![insert("user", "u1", false), insert("tag", "t1", false)])
            .unwrap();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let _id = conn.observe(&users(), move || counter.set(counter.get() + 1));

        assert_eq!(conn.clear().unwrap(), 2);
        assert!(conn.is_empty());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_dump_and_load() {
        let conn = connection();
        conn.execute(vec![insert("user", "u1", false), insert("tag", "t1", false)])
            .unwrap();
        let dump = conn.dump();
        assert_eq!(dump.row_count(), 2);
        assert!(conn.load(&dump).is_err());

        let fresh = connection();
        assert_eq!(fresh.load(&dump).unwrap(), 2);
        assert_eq!(fresh.dump(), dump);
    }
}
