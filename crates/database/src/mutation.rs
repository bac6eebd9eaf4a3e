//! Compound mutation compiler.
//!
//! Flattens an entity graph (an object or array of objects whose
//! relationship keys may hold nested entities) into per-table insert
//! statements and per-row update statements. Entities that share an
//! identifier anywhere in the graph collapse into one unit, later keys
//! overwriting earlier ones.

use crate::codec::encode;
use crate::existence::{ExistenceCache, Identifier};
use crate::schema::{shadow_name, Relationship, SchemaRegistry, TableSchema};
use hashbrown::HashMap;
use lumen_core::{Error, Result, Value};
use lumen_query::ast::{ColumnRef, InsertStatement, Predicate, Statement, UpdateStatement};
use serde_json::Value as Json;

/// How units are routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationMode {
    /// Root entities are inserted and an existing root key fails the write.
    /// Nested entities known to the existence cache are updated.
    Insert,
    /// Units known to the existence cache are updated, others are inserted
    /// or replace an existing row.
    Upsert,
}

/// Output of a compilation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MutationPlan {
    /// Inserts grouped per table in first-seen order, then updates.
    pub statements: Vec<Statement>,
    /// Identifiers of the inserted units, for the existence cache.
    pub inserted: Vec<Identifier>,
}

struct Unit {
    id: Identifier,
    primary_key: String,
    insert: bool,
    values: Vec<(String, Value)>,
}

impl Unit {
    fn set(&mut self, column: String, value: Value) {
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
    }
}

/// Compiles entity graphs into statements.
pub struct MutationCompiler<'a> {
    registry: &'a SchemaRegistry,
    cache: &'a ExistenceCache,
    mode: MutationMode,
    sharing: HashMap<Identifier, usize>,
    units: Vec<Unit>,
}

impl<'a> MutationCompiler<'a> {
    pub fn new(registry: &'a SchemaRegistry, cache: &'a ExistenceCache, mode: MutationMode) -> Self {
        Self {
            registry,
            cache,
            mode,
            sharing: HashMap::new(),
            units: Vec::new(),
        }
    }

    /// Compiles `graph`, rooted at `table`.
    pub fn compile(mut self, table: &str, graph: &Json) -> Result<MutationPlan> {
        let schema = self.registry.table(table)?;
        self.visit(&schema, graph, true)?;
        Ok(self.finish())
    }

    fn visit(&mut self, schema: &TableSchema, node: &Json, root: bool) -> Result<()> {
        match node {
            Json::Array(items) => items
                .iter()
                .try_for_each(|item| self.visit(schema, item, root)),
            Json::Object(entity) => self.visit_entity(schema, entity, root),
            other => Err(Error::invalid_query(format!(
                "an entity of {} must be an object, got {}",
                schema.name(),
                other
            ))),
        }
    }

    fn visit_entity(
        &mut self,
        schema: &TableSchema,
        entity: &serde_json::Map<String, Json>,
        root: bool,
    ) -> Result<()> {
        let primary_key = schema.primary_key();
        let key = match entity.get(primary_key) {
            Some(raw) if !raw.is_null() => encode(schema.primary_def().column_type, raw).primary,
            _ => return Err(Error::missing_primary_key(schema.name(), primary_key)),
        };
        let id = Identifier::new(schema.name(), key);
        let strict = root && self.mode == MutationMode::Insert;
        let unit = match self.sharing.get(&id) {
            Some(&index) => {
                self.units[index].insert |= strict;
                index
            }
            None => {
                let insert = strict || !self.cache.contains(&id);
                self.sharing.insert(id.clone(), self.units.len());
                self.units.push(Unit {
                    id,
                    primary_key: primary_key.to_string(),
                    insert,
                    values: Vec::new(),
                });
                self.units.len() - 1
            }
        };

        for (name, raw) in entity {
            if let Some(relationship) = schema.relationship(name) {
                if relationship.kind == Relationship::ManyToMany {
                    return Err(Error::unimplemented(format!(
                        "writing many-to-many relationship {}.{}",
                        schema.name(),
                        name
                    )));
                }
                if !raw.is_null() {
                    let target = self.registry.table(&relationship.target)?;
                    self.visit(&target, raw, false)?;
                }
            } else if let Some(def) = schema.column(name) {
                let encoded = encode(def.column_type, raw);
                self.units[unit].set(name.clone(), encoded.primary);
                if let Some(shadow) = encoded.shadow {
                    self.units[unit].set(shadow_name(name), shadow);
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> MutationPlan {
        let mut tables: Vec<String> = Vec::new();
        let mut rows: HashMap<String, Vec<Vec<(String, Value)>>> = HashMap::new();
        let mut updates = Vec::new();
        let mut inserted = Vec::new();

        for unit in self.units {
            if unit.insert {
                let table = unit.id.table.clone();
                if !rows.contains_key(&table) {
                    tables.push(table.clone());
                }
                rows.entry(table).or_default().push(unit.values);
                inserted.push(unit.id);
                continue;
            }
            let set: Vec<(String, Value)> = unit
                .values
                .into_iter()
                .filter(|(column, _)| *column != unit.primary_key)
                .collect();
            if set.is_empty() {
                continue;
            }
            updates.push(Statement::Update(UpdateStatement {
                filter: Some(Predicate::eq(
                    ColumnRef::new(unit.id.table.as_str(), unit.primary_key),
                    unit.id.key,
                )),
                table: unit.id.table,
                set,
            }));
        }

        let replace = self.mode == MutationMode::Upsert;
        let mut statements: Vec<Statement> = tables
            .into_iter()
            .filter_map(|table| {
                let rows = rows.remove(&table)?;
                Some(Statement::Insert(InsertStatement {
                    table,
                    rows,
                    replace,
                }))
            })
            .collect();
        statements.extend(updates);
        MutationPlan {
            statements,
            inserted,
        }
    }
}
