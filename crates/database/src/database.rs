//! Database - main entry point.
//!
//! A [`Database`] owns the schema registry, the engine connection and the
//! existence cache. Writes take entity graphs as JSON and compile them into
//! statement batches; reads return [`QueryToken`]s that compile lazily.

use crate::clause::Clause;
use crate::codec::encode;
use crate::config::DatabaseConfig;
use crate::existence::{CacheRollback, ExistenceCache, Identifier};
use crate::hydrate::hydrate;
use crate::join::{compile_query, Field, JoinMode};
use crate::mutation::{MutationCompiler, MutationMode};
use crate::predicate::PredicateCompiler;
use crate::schema::{shadow_name, SchemaDef, SchemaRegistry};
use crate::selector::{QuerySelector, Selector};
use crate::token::QueryToken;
use crate::transaction::TransactionContext;
use hashbrown::HashSet;
use lumen_core::{Error, Result, Value};
use lumen_query::ast::{
    ColumnRef, DeleteStatement, OrderBy, Predicate, SortOrder, Statement, UpdateStatement,
};
use lumen_reactive::Deferred;
use lumen_storage::{Connection, Dump, ExecutionSummary};
use serde_json::Value as Json;
use std::cell::RefCell;
use std::rc::Rc;

/// Rows written by one submitted batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutorResult {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl From<ExecutionSummary> for ExecutorResult {
    fn from(summary: ExecutionSummary) -> Self {
        Self {
            inserted: summary.inserted,
            updated: summary.updated,
            deleted: summary.deleted,
        }
    }
}

/// A read request.
#[derive(Clone, Debug, Default)]
pub struct Query {
    /// Fields to select; every column and relationship when absent.
    pub fields: Option<Vec<Field>>,
    pub filter: Option<Clause>,
    /// Dotted column paths with their direction.
    pub order_by: Vec<(String, SortOrder)>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    /// Overrides the database's default join mode.
    pub join_mode: Option<JoinMode>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn filter(mut self, clause: impl Into<Clause>) -> Self {
        self.filter = Some(clause.into());
        self
    }

    pub fn order_by(mut self, path: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((path.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn join_mode(mut self, mode: JoinMode) -> Self {
        self.join_mode = Some(mode);
        self
    }
}

/// Handed to a dispose hook so it can delete related rows in the same
/// batch as the removal that triggered it.
pub struct DisposeScope {
    database: Database,
    /// Writes buffered ahead of the removal, when it runs in a transaction.
    pending: Vec<Statement>,
    statements: Vec<Statement>,
    rollback: CacheRollback,
}

impl DisposeScope {
    /// Deletes the rows of `table` matching `clause` along with the
    /// removal. Returns the number of rows matched.
    pub fn delete(&mut self, table: &str, clause: impl Into<Clause>) -> Result<usize> {
        let matched = self
            .database
            .matching(table, &clause.into(), &self.pending, false)?;
        let count = matched.keys.len();
        let (statement, rollback) = self.database.prepare_delete(table, matched);
        self.statements.extend(statement);
        self.rollback.merge(rollback);
        Ok(count)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }
}

/// Rows matched by a filter, read before they are written.
struct Matched {
    primary_key: String,
    keys: Vec<Value>,
    /// Hydrated entities, only read for `remove`.
    rows: Vec<Json>,
}

struct Inner {
    config: DatabaseConfig,
    registry: RefCell<SchemaRegistry>,
    connection: RefCell<Option<Connection>>,
    cache: RefCell<ExistenceCache>,
}

/// The main database interface.
///
/// Handles are cheap to clone and share all state.
#[derive(Clone)]
pub struct Database {
    inner: Rc<Inner>,
}

impl Database {
    /// Creates an unconnected database.
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                registry: RefCell::new(SchemaRegistry::new()),
                connection: RefCell::new(None),
                cache: RefCell::new(ExistenceCache::new()),
            }),
        }
    }

    /// Returns the database name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Declares a table. Only allowed before `connect`.
    pub fn define_schema(&self, name: &str, def: SchemaDef) -> Result<()> {
        self.inner.registry.borrow_mut().define(name, def)
    }

    /// Opens the engine with every declared table.
    pub fn connect(&self) -> Result<()> {
        let mut registry = self.inner.registry.borrow_mut();
        if registry.is_connected() {
            return Err(Error::invalid_operation(format!(
                "database {} is already connected",
                self.name()
            )));
        }
        let tables = registry.materialize()?;
        let connection = Connection::open(tables)?;
        registry.seal();
        log::debug!("database {} connected with {} table(s)", self.name(), registry.len());
        *self.inner.connection.borrow_mut() = Some(connection);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.borrow().is_some()
    }

    /// The engine connection.
    pub fn connection(&self) -> Result<Connection> {
        self.inner
            .connection
            .borrow()
            .clone()
            .ok_or(Error::NotConnected)
    }

    /// Inserts an entity graph. Fails if any row already exists.
    pub fn insert(
        &self,
        table: &str,
        graph: &Json,
        tx: Option<&TransactionContext>,
    ) -> Result<ExecutorResult> {
        self.write(table, graph, MutationMode::Insert, tx)
    }

    /// Inserts or updates every entity of a graph.
    pub fn upsert(
        &self,
        table: &str,
        graph: &Json,
        tx: Option<&TransactionContext>,
    ) -> Result<ExecutorResult> {
        self.write(table, graph, MutationMode::Upsert, tx)
    }

    fn write(
        &self,
        table: &str,
        graph: &Json,
        mode: MutationMode,
        tx: Option<&TransactionContext>,
    ) -> Result<ExecutorResult> {
        self.connection()?;
        let plan = {
            let registry = self.inner.registry.borrow();
            let cache = self.inner.cache.borrow();
            MutationCompiler::new(&registry, &cache, mode).compile(table, graph)?
        };
        let rollback = self.inner.cache.borrow_mut().insert_all(plan.inserted);
        self.dispatch(plan.statements, rollback, tx)
    }

    /// Sets columns on every row matching `clause`. Primary keys and
    /// unknown keys in the patch are ignored with a warning.
    pub fn update(
        &self,
        table: &str,
        clause: impl Into<Clause>,
        patch: &Json,
        tx: Option<&TransactionContext>,
    ) -> Result<ExecutorResult> {
        self.connection()?;
        let patch = patch
            .as_object()
            .ok_or_else(|| Error::invalid_operation("an update patch must be an object"))?;
        let registry = self.inner.registry.borrow();
        let schema = registry.table(table)?;

        let mut set = Vec::new();
        for (key, raw) in patch {
            if key == schema.primary_key() {
                log::warn!("ignoring update of primary key {}.{}", table, key);
                continue;
            }
            match schema.column(key) {
                Some(def) => {
                    let encoded = encode(def.column_type, raw);
                    set.push((key.clone(), encoded.primary));
                    if let Some(shadow) = encoded.shadow {
                        set.push((shadow_name(key), shadow));
                    }
                }
                None => log::warn!("ignoring {} in update of {}: not a column", key, table),
            }
        }
        if set.is_empty() {
            return Ok(ExecutorResult::default());
        }

        drop(registry);

        let matched = self.matching(table, &clause.into(), &pending(tx), false)?;
        if matched.keys.is_empty() {
            return Ok(ExecutorResult::default());
        }
        let statement = Statement::Update(UpdateStatement {
            table: table.to_string(),
            set,
            filter: Some(Predicate::in_list(
                ColumnRef::new(table, matched.primary_key),
                matched.keys,
            )),
        });
        self.dispatch(vec![statement], CacheRollback::new(), tx)
    }

    /// Deletes every row matching `clause`.
    pub fn delete(
        &self,
        table: &str,
        clause: impl Into<Clause>,
        tx: Option<&TransactionContext>,
    ) -> Result<ExecutorResult> {
        let matched = self.matching(table, &clause.into(), &pending(tx), false)?;
        let (statement, rollback) = self.prepare_delete(table, matched);
        self.dispatch(statement.into_iter().collect(), rollback, tx)
    }

    /// Deletes every row matching `clause`, letting the table's dispose
    /// hook delete dependent rows in the same batch.
    pub fn remove(
        &self,
        table: &str,
        clause: impl Into<Clause>,
        tx: Option<&TransactionContext>,
    ) -> Result<ExecutorResult> {
        let handler = self
            .inner
            .registry
            .borrow()
            .table(table)?
            .dispose_handler()
            .cloned();
        let buffered = pending(tx);
        let mut matched = self.matching(table, &clause.into(), &buffered, handler.is_some())?;
        let rows = std::mem::take(&mut matched.rows);
        let (statement, rollback) = self.prepare_delete(table, matched);
        let mut scope = DisposeScope {
            database: self.clone(),
            pending: buffered,
            statements: statement.into_iter().collect(),
            rollback,
        };
        match handler {
            Some(handler) => {
                if let Err(error) = handler(&rows, &mut scope) {
                    self.undo(scope.rollback);
                    return Err(error);
                }
            }
            None => log::warn!("{} has no dispose handler, removing rows only", table),
        }
        self.dispatch(scope.statements, scope.rollback, tx)
    }

    /// Creates a lazily compiled read.
    pub fn get(&self, table: &str, query: Query) -> QueryToken {
        let database = self.clone();
        let table = table.to_string();
        QueryToken::new(Deferred::new(move || database.selector(&table, &query)))
    }

    fn selector(&self, table: &str, query: &Query) -> Result<Selector> {
        let connection = self.connection()?;
        let registry = self.inner.registry.borrow();
        let mode = query.join_mode.unwrap_or(self.inner.config.join_mode);
        let plan = compile_query(&registry, table, query.fields.as_deref(), mode)?;
        let predicate = match &query.filter {
            Some(clause) => PredicateCompiler::new(&registry, &plan.aliases).compile(clause)?,
            None => None,
        };
        let mut order_by = Vec::with_capacity(query.order_by.len());
        for (path, order) in &query.order_by {
            match plan.resolve(&registry, path) {
                Some((column, _)) => order_by.push(OrderBy {
                    column,
                    order: *order,
                }),
                None => log::warn!("ignoring order by {} on {}: unknown column", path, table),
            }
        }
        Ok(Selector::query(QuerySelector::new(
            connection,
            &plan,
            predicate,
            order_by,
            query.limit,
            query.skip,
        )))
    }

    /// Starts a buffered transaction.
    pub fn transaction(&self) -> Result<TransactionContext> {
        self.connection()?;
        Ok(TransactionContext::new(self.clone()))
    }

    /// Snapshots every table as JSON.
    pub fn dump(&self) -> Result<Json> {
        serde_json::to_value(self.connection()?.dump()).map_err(Error::serialization)
    }

    /// Loads a snapshot into an empty database. Returns the number of rows
    /// loaded.
    pub fn load(&self, snapshot: &Json) -> Result<usize> {
        let connection = self.connection()?;
        let dump: Dump = serde_json::from_value(snapshot.clone()).map_err(Error::serialization)?;
        let registry = self.inner.registry.borrow();
        let mut ids = Vec::new();
        for (table, rows) in &dump.tables {
            let schema = registry.table(table)?;
            ids.extend(
                rows.iter()
                    .filter_map(|row| row.get(schema.primary_key()))
                    .map(|key| Identifier::new(table.as_str(), key.clone())),
            );
        }
        drop(registry);

        let loaded = connection.load(&dump)?;
        let _ = self.inner.cache.borrow_mut().insert_all(ids);
        log::debug!("loaded {} row(s) into {}", loaded, self.name());
        Ok(loaded)
    }

    /// Deletes every row and forgets every known key.
    pub fn dispose(&self) -> Result<()> {
        let connection = self.connection()?;
        let deleted = connection.clear()?;
        self.inner.cache.borrow_mut().clear();
        log::debug!("disposed {}: {} row(s) deleted", self.name(), deleted);
        Ok(())
    }

    /// Number of identifiers in the existence cache.
    pub fn known_rows(&self) -> usize {
        self.inner.cache.borrow().len()
    }

    /// Whether the existence cache holds an identifier.
    pub fn is_known(&self, table: &str, key: impl Into<Value>) -> bool {
        self.inner
            .cache
            .borrow()
            .contains(&Identifier::new(table, key.into()))
    }

    /// Reads the entities matching `clause`. The filter may reach through
    /// relationships, so the full graph is joined. `pending` writes are
    /// applied first so a transaction sees its own buffered statements.
    fn matching(
        &self,
        table: &str,
        clause: &Clause,
        pending: &[Statement],
        with_rows: bool,
    ) -> Result<Matched> {
        let connection = self.connection()?;
        let registry = self.inner.registry.borrow();
        let schema = registry.table(table)?;
        let plan = compile_query(&registry, table, None, JoinMode::Implicit)?;
        let mut stmt = plan.select();
        if let Some(filter) = PredicateCompiler::new(&registry, &plan.aliases).compile(clause)? {
            stmt = stmt.filter(filter);
        }
        drop(registry);

        let result = if pending.is_empty() {
            connection.select(&stmt)?
        } else {
            connection.preview(pending, &stmt)?
        };
        let index = result
            .column_index(&plan.root_primary)
            .ok_or_else(|| Error::invalid_query(format!("no primary key column in {}", stmt)))?;
        let mut seen = HashSet::new();
        let keys = result
            .rows
            .iter()
            .filter_map(|row| row.get(index))
            .filter(|key| !key.is_null() && seen.insert(*key))
            .cloned()
            .collect();
        Ok(Matched {
            primary_key: schema.primary_key().to_string(),
            keys,
            rows: if with_rows {
                hydrate(&result, &plan.shape)?
            } else {
                Vec::new()
            },
        })
    }

    /// A delete of the matched keys, with the cache already updated.
    fn prepare_delete(
        &self,
        table: &str,
        matched: Matched,
    ) -> (Option<Statement>, CacheRollback) {
        if matched.keys.is_empty() {
            return (None, CacheRollback::new());
        }
        let rollback = self.inner.cache.borrow_mut().remove_all(
            matched
                .keys
                .iter()
                .map(|key| Identifier::new(table, key.clone())),
        );
        let statement = Statement::Delete(DeleteStatement {
            table: table.to_string(),
            filter: Some(Predicate::in_list(
                ColumnRef::new(table, matched.primary_key),
                matched.keys,
            )),
        });
        (Some(statement), rollback)
    }

    /// Buffers into `tx` or submits right away.
    fn dispatch(
        &self,
        statements: Vec<Statement>,
        rollback: CacheRollback,
        tx: Option<&TransactionContext>,
    ) -> Result<ExecutorResult> {
        match tx {
            Some(tx) => {
                tx.enqueue(statements, rollback)?;
                Ok(ExecutorResult::default())
            }
            None => self.submit(statements, rollback),
        }
    }

    /// Executes a batch as one transaction, undoing the cache updates that
    /// anticipated it if it fails.
    pub(crate) fn submit(
        &self,
        statements: Vec<Statement>,
        rollback: CacheRollback,
    ) -> Result<ExecutorResult> {
        let connection = match self.connection() {
            Ok(connection) => connection,
            Err(error) => {
                self.undo(rollback);
                return Err(error);
            }
        };
        match connection.execute(statements) {
            Ok(summary) => Ok(summary.into()),
            Err(error) => {
                log::debug!("batch failed on {}: {}", self.name(), error);
                self.undo(rollback);
                Err(error)
            }
        }
    }

    pub(crate) fn undo(&self, rollback: CacheRollback) {
        if !rollback.is_empty() {
            self.inner.cache.borrow_mut().rollback(rollback);
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(DatabaseConfig::default())
    }
}

/// Statements buffered in `tx`, if any.
fn pending(tx: Option<&TransactionContext>) -> Vec<Statement> {
    tx.map(TransactionContext::pending).unwrap_or_default()
}
