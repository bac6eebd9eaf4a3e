//! Join-graph query compiler.
//!
//! Compiles a table name and a field selection into one flat select with a
//! left outer join per traversed relationship, plus the [`Shape`] needed to
//! fold the flat rows back into nested objects.
//!
//! Every table occurrence gets its own alias, `{table}@{n}`, counted per
//! compilation, so a table reached through two paths is joined twice. In
//! implicit mode a relationship whose target already appears on the current
//! path is not traversed, which keeps self-referencing schemas finite.

use crate::alias::AliasGraph;
use crate::predicate::{CompileWarning, PredicateCompiler};
use crate::schema::{
    shadow_name, ColumnType, Relationship, RelationshipDef, SchemaRegistry, TableHandle,
    TableSchema,
};
use crate::hydrate::{Shape, ShapeNode};
use hashbrown::{HashMap, HashSet};
use lumen_core::{Error, Result};
use lumen_query::ast::{ColumnRef, Join, Predicate, SelectStatement, TableRef};
use std::rc::Rc;

/// How relationships without an explicit field list are traversed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum JoinMode {
    /// Bare relationships pull in their own relationships too, stopping at
    /// tables already on the path.
    #[default]
    Implicit,
    /// Only what is listed is joined; a bare relationship selects the
    /// target's columns.
    Explicit,
}

/// One requested field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    /// A column, or a relationship selected bare.
    Column(String),
    /// A relationship with a nested selection.
    Relation {
        name: String,
        fields: Option<Vec<Field>>,
    },
}

impl Field {
    pub fn column(name: impl Into<String>) -> Self {
        Field::Column(name.into())
    }

    pub fn relation(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Field::Relation {
            name: name.into(),
            fields: Some(fields),
        }
    }

    /// Parses a JSON field list: strings are columns, an object maps
    /// relationship names to nested lists.
    ///
    /// ```
    /// use lumen_database::Field;
    /// use serde_json::json;
    ///
    /// let fields = Field::from_json(&json!(["_id", { "owner": ["name"] }])).unwrap();
    /// assert_eq!(
    ///     fields,
    ///     vec![Field::column("_id"), Field::relation("owner", vec![Field::column("name")])]
    /// );
    /// ```
    pub fn from_json(value: &serde_json::Value) -> Result<Vec<Field>> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::invalid_query("fields must be an array"))?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                serde_json::Value::String(name) => out.push(Field::Column(name.clone())),
                serde_json::Value::Object(map) => {
                    for (name, nested) in map {
                        let fields = match nested {
                            serde_json::Value::Null | serde_json::Value::Bool(true) => None,
                            other => Some(Field::from_json(other)?),
                        };
                        out.push(Field::Relation {
                            name: name.clone(),
                            fields,
                        });
                    }
                }
                other => {
                    return Err(Error::invalid_query(format!(
                        "unsupported field entry {}",
                        other
                    )))
                }
            }
        }
        Ok(out)
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Field::column(name)
    }
}

/// The compiled form of a read.
#[derive(Clone, Debug)]
pub struct JoinPlan {
    pub root: TableRef,
    pub columns: Vec<ColumnRef>,
    /// Joins in order; a relationship's join precedes the joins nested
    /// under it.
    pub joins: Vec<Join>,
    pub shape: Shape,
    pub aliases: AliasGraph,
    pub root_primary: ColumnRef,
    pub warnings: Vec<CompileWarning>,
}

impl JoinPlan {
    /// The unfiltered, unordered select of this plan.
    pub fn select(&self) -> SelectStatement {
        let mut stmt = SelectStatement::new(self.root.clone()).columns(self.columns.clone());
        for join in &self.joins {
            stmt = stmt.join(join.table.clone(), join.on.clone());
        }
        stmt
    }

    /// Resolves a dotted column path against the joined aliases.
    pub fn resolve(&self, registry: &SchemaRegistry, path: &str) -> Option<(ColumnRef, ColumnType)> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let column = segments.pop()?;
        let mut alias = self.aliases.root();
        for segment in segments {
            alias = self.aliases.child(alias, segment)?;
        }
        let table = registry.table(self.aliases.table_of(alias)?).ok()?;
        let def = table.column(column)?;
        Some((ColumnRef::new(alias, column), def.column_type))
    }
}

/// Compiles a read of `table`.
pub fn compile_query(
    registry: &SchemaRegistry,
    table: &str,
    fields: Option<&[Field]>,
    mode: JoinMode,
) -> Result<JoinPlan> {
    let schema = registry.table(table)?;
    let mut compiler = QueryCompiler {
        registry,
        mode,
        counters: HashMap::new(),
        columns: Vec::new(),
        joins: Vec::new(),
        aliases: AliasGraph::new(String::new(), table),
        path: Vec::new(),
        warnings: Vec::new(),
    };
    let root_alias = compiler.next_alias(table);
    compiler.aliases = AliasGraph::new(root_alias.clone(), table);
    let shape = compiler.compile_level(&root_alias, schema, fields, true)?;
    log::trace!(
        "compiled {} into {} column(s) and {} join(s)",
        table,
        compiler.columns.len(),
        compiler.joins.len()
    );
    Ok(JoinPlan {
        root: TableRef::new(table, root_alias),
        columns: compiler.columns,
        joins: compiler.joins,
        root_primary: shape.primary.clone(),
        shape,
        aliases: compiler.aliases,
        warnings: compiler.warnings,
    })
}

type Selection<'f> = (Vec<String>, Vec<(String, Option<&'f [Field]>)>);

struct QueryCompiler<'a> {
    registry: &'a SchemaRegistry,
    mode: JoinMode,
    counters: HashMap<String, usize>,
    columns: Vec<ColumnRef>,
    joins: Vec<Join>,
    aliases: AliasGraph,
    path: Vec<String>,
    warnings: Vec<CompileWarning>,
}

impl<'a> QueryCompiler<'a> {
    fn next_alias(&mut self, table: &str) -> String {
        let counter = self.counters.entry(table.to_string()).or_insert(0);
        let alias = format!("{}@{}", table, counter);
        *counter += 1;
        alias
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(CompileWarning::new(message));
    }

    fn compile_level(
        &mut self,
        alias: &str,
        schema: Rc<TableSchema>,
        fields: Option<&[Field]>,
        include_relations: bool,
    ) -> Result<Shape> {
        self.path.push(schema.name().to_string());
        let shape = self.compile_fields(alias, &schema, fields, include_relations);
        self.path.pop();
        shape
    }

    fn compile_fields(
        &mut self,
        alias: &str,
        schema: &Rc<TableSchema>,
        fields: Option<&[Field]>,
        include_relations: bool,
    ) -> Result<Shape> {
        let (mut scalars, relations) = self.selection(schema, fields, include_relations);
        if scalars.is_empty() && !relations.is_empty() {
            return Err(Error::invalid_query(format!(
                "a query on {} must select at least one column",
                schema.name()
            )));
        }
        let primary_key = schema.primary_key().to_string();
        let hide_primary = !scalars.contains(&primary_key);
        if hide_primary {
            scalars.insert(0, primary_key.clone());
        }

        let mut keys = HashSet::new();
        let mut shape_fields = Vec::with_capacity(scalars.len() + relations.len());
        for name in scalars {
            if !keys.insert(name.clone()) {
                return Err(Error::alias_conflict(schema.name(), name));
            }
            let def = schema
                .column(&name)
                .ok_or_else(|| Error::column_not_found(schema.name(), name.as_str()))?;
            let column = ColumnRef::new(alias, name.as_str());
            self.columns.push(column.clone());
            let shadow = def.column_type.has_shadow().then(|| {
                let shadow = ColumnRef::new(alias, shadow_name(&name));
                self.columns.push(shadow.clone());
                shadow
            });
            shape_fields.push((
                name,
                ShapeNode::Field {
                    column,
                    shadow,
                    column_type: def.column_type,
                },
            ));
        }

        for (name, nested) in relations {
            if !keys.insert(name.clone()) {
                return Err(Error::alias_conflict(schema.name(), name));
            }
            let relationship = schema
                .relationship(&name)
                .cloned()
                .ok_or_else(|| Error::invalid_query(format!("unknown relationship {}", name)))?;
            let target = self.registry.table(&relationship.target)?;
            if self.mode == JoinMode::Implicit && self.path.iter().any(|t| t == target.name()) {
                log::trace!(
                    "not traversing {}.{}: {} is already on this path",
                    schema.name(),
                    name,
                    target.name()
                );
                continue;
            }

            let child_alias = self.next_alias(target.name());
            self.aliases.add(child_alias.clone(), target.name());
            self.aliases.link(alias, name.clone(), child_alias.clone());

            let outer = std::mem::take(&mut self.joins);
            let descend = nested.is_some() || self.mode == JoinMode::Implicit;
            let child = self.compile_level(&child_alias, target.clone(), nested, descend);
            let inner = std::mem::replace(&mut self.joins, outer);
            let child = child?;

            let on = self.join_condition(alias, &name, &relationship, &child_alias, target.clone());
            self.joins.push(Join {
                table: TableRef::new(target.name(), child_alias),
                on,
            });
            self.joins.extend(inner);

            let node = match relationship.kind {
                Relationship::OneToOne => ShapeNode::One(child),
                Relationship::OneToMany => ShapeNode::Many(child),
                Relationship::ManyToMany => {
                    return Err(Error::unimplemented(format!(
                        "many-to-many relationship {}.{}",
                        schema.name(),
                        name
                    )))
                }
            };
            shape_fields.push((name, node));
        }

        Ok(Shape {
            primary: ColumnRef::new(alias, primary_key),
            hide_primary,
            fields: shape_fields,
        })
    }

    /// Splits a selection into columns and relationships, dropping unknown
    /// names with a warning.
    fn selection<'f>(
        &mut self,
        schema: &TableSchema,
        fields: Option<&'f [Field]>,
        include_relations: bool,
    ) -> Selection<'f> {
        let fields = match fields {
            Some(fields) => fields,
            None => {
                let columns = schema.columns().map(|(name, _)| name.to_string()).collect();
                let relations = if include_relations {
                    schema
                        .relationships()
                        .map(|(name, _)| (name.to_string(), None))
                        .collect()
                } else {
                    Vec::new()
                };
                return (columns, relations);
            }
        };

        let mut columns = Vec::new();
        let mut relations = Vec::new();
        for field in fields {
            match field {
                Field::Column(name) if schema.column(name).is_some() => columns.push(name.clone()),
                Field::Column(name) if schema.relationship(name).is_some() => {
                    relations.push((name.clone(), None))
                }
                Field::Relation { name, fields } if schema.relationship(name).is_some() => {
                    relations.push((name.clone(), fields.as_deref()))
                }
                Field::Column(name) | Field::Relation { name, .. } => self.warn(format!(
                    "field {} does not exist on {}, skipping it",
                    name,
                    schema.name()
                )),
            }
        }
        (columns, relations)
    }

    /// Builds the `on` condition of a relationship join. A failing builder
    /// degrades to a join without a condition.
    fn join_condition(
        &mut self,
        owner: &str,
        name: &str,
        relationship: &RelationshipDef,
        child_alias: &str,
        target: Rc<TableSchema>,
    ) -> Option<Predicate> {
        let handle = TableHandle::new(child_alias, target);
        let compiled = (relationship.join)(&handle).and_then(|clause| {
            let mut compiler = PredicateCompiler::new(self.registry, &self.aliases);
            let predicate = compiler.compile_in(owner, &clause);
            self.warnings.extend(compiler.into_warnings());
            predicate
        });
        match compiled {
            Ok(Some(predicate)) => Some(predicate),
            Ok(None) => {
                self.warn(format!(
                    "join condition of {} is empty, joining {} without a condition",
                    name, child_alias
                ));
                None
            }
            Err(error) => {
                self.warn(format!(
                    "building the join condition of {} failed ({}), joining {} without a condition",
                    name, error, child_alias
                ));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Clause;
    use crate::schema::{ColumnDef, SchemaDef};

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .define(
                "post",
                SchemaDef::new()
                    .column("_id", ColumnDef::new(ColumnType::String).primary_key())
                    .column("title", ColumnDef::new(ColumnType::String))
                    .column("ownerId", ColumnDef::new(ColumnType::String))
                    .relationship(
                        "owner",
                        RelationshipDef::one_to_one("user", |user| {
                            Ok(Clause::object([("ownerId", user.column("_id")?)]))
                        }),
                    )
                    .relationship(
                        "comments",
                        RelationshipDef::one_to_many("comment", |comment| {
                            Ok(Clause::object([("_id", comment.column("postId")?)]))
                        }),
                    ),
            )
            .unwrap();
        registry
            .define(
                "user",
                SchemaDef::new()
                    .column("_id", ColumnDef::new(ColumnType::String).primary_key())
                    .column("name", ColumnDef::new(ColumnType::String)),
            )
            .unwrap();
        registry
            .define(
                "comment",
                SchemaDef::new()
                    .column("_id", ColumnDef::new(ColumnType::String).primary_key())
                    .column("postId", ColumnDef::new(ColumnType::String))
                    .column("authorId", ColumnDef::new(ColumnType::String))
                    .relationship(
                        "author",
                        RelationshipDef::one_to_one("user", |user| {
                            Ok(Clause::object([("authorId", user.column("_id")?)]))
                        }),
                    ),
            )
            .unwrap();
        registry
            .define(
                "node",
                SchemaDef::new()
                    .column("_id", ColumnDef::new(ColumnType::String).primary_key())
                    .column("parentId", ColumnDef::new(ColumnType::String))
                    .relationship(
                        "parent",
                        RelationshipDef::one_to_one("node", |node| {
                            Ok(Clause::object([("parentId", node.column("_id")?)]))
                        }),
                    ),
            )
            .unwrap();
        registry
    }

    fn aliases_of(plan: &JoinPlan) -> Vec<String> {
        plan.joins.iter().map(|j| j.table.alias.clone()).collect()
    }

    #[test]
    fn test_default_selection_joins_everything_once() {
        let registry = registry();
        let plan = compile_query(&registry, "post", None, JoinMode::Implicit).unwrap();
        assert_eq!(plan.root, TableRef::new("post", "post@0"));
        assert_eq!(aliases_of(&plan), vec!["user@0", "comment@0", "user@1"]);
        assert_eq!(
            plan.joins[0].on,
            Some(Predicate::columns_eq(
                ColumnRef::new("post@0", "ownerId"),
                ColumnRef::new("user@0", "_id")
            ))
        );
        assert_eq!(plan.root_primary, ColumnRef::new("post@0", "_id"));
        assert!(!plan.shape.hide_primary);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_hidden_primary_key() {
        let registry = registry();
        let fields = vec![Field::column("title")];
        let plan = compile_query(&registry, "post", Some(&fields), JoinMode::Implicit).unwrap();
        assert!(plan.shape.hide_primary);
        assert_eq!(plan.columns[0], ColumnRef::new("post@0", "_id"));
        assert!(plan.joins.is_empty());
    }

    #[test]
    fn test_relationship_only_selection_fails() {
        let registry = registry();
        let fields = vec![Field::column("owner")];
        let result = compile_query(&registry, "post", Some(&fields), JoinMode::Implicit);
        assert!(matches!(result, Err(Error::InvalidQuery { .. })));
    }

    #[test]
    fn test_duplicate_key_conflicts() {
        let registry = registry();
        let fields = vec![Field::column("title"), Field::column("title")];
        let result = compile_query(&registry, "post", Some(&fields), JoinMode::Implicit);
        assert!(matches!(result, Err(Error::AliasConflict { .. })));
    }

    #[test]
    fn test_unknown_table_and_field() {
        let registry = registry();
        assert!(matches!(
            compile_query(&registry, "nope", None, JoinMode::Implicit),
            Err(Error::TableNotFound { .. })
        ));
        let fields = vec![Field::column("_id"), Field::column("missing")];
        let plan = compile_query(&registry, "post", Some(&fields), JoinMode::Implicit).unwrap();
        assert_eq!(plan.warnings.len(), 1);
        assert_eq!(plan.columns, vec![ColumnRef::new("post@0", "_id")]);
    }

    #[test]
    fn test_self_reference_terminates_in_implicit_mode() {
        let registry = registry();
        let plan = compile_query(&registry, "node", None, JoinMode::Implicit).unwrap();
        assert!(plan.joins.is_empty());
        assert_eq!(plan.shape.fields.len(), 2);

        let fields = vec![
            Field::column("_id"),
            Field::relation("parent", vec![Field::column("_id")]),
        ];
        let plan = compile_query(&registry, "node", Some(&fields), JoinMode::Explicit).unwrap();
        assert_eq!(aliases_of(&plan), vec!["node@1"]);
    }

    #[test]
    fn test_explicit_bare_relation_selects_columns_only() {
        let registry = registry();
        let fields = vec![Field::column("_id"), Field::column("comments")];
        let plan = compile_query(&registry, "post", Some(&fields), JoinMode::Explicit).unwrap();
        assert_eq!(aliases_of(&plan), vec!["comment@0"]);
        let plan = compile_query(&registry, "post", Some(&fields), JoinMode::Implicit).unwrap();
        assert_eq!(aliases_of(&plan), vec!["comment@0", "user@0"]);
    }

    #[test]
    fn test_failed_join_builder_degrades() {
        let mut registry = registry();
        registry
            .define(
                "broken",
                SchemaDef::new()
                    .column("_id", ColumnDef::new(ColumnType::String).primary_key())
                    .relationship(
                        "owner",
                        RelationshipDef::one_to_one("user", |user| {
                            Ok(Clause::object([("_id", user.column("missing")?)]))
                        }),
                    ),
            )
            .unwrap();
        let plan = compile_query(&registry, "broken", None, JoinMode::Implicit).unwrap();
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].on, None);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_resolve_dotted_path() {
        let registry = registry();
        let plan = compile_query(&registry, "post", None, JoinMode::Implicit).unwrap();
        assert_eq!(
            plan.resolve(&registry, "owner.name"),
            Some((ColumnRef::new("user@0", "name"), ColumnType::String))
        );
        assert_eq!(plan.resolve(&registry, "owner.missing"), None);
    }
}
