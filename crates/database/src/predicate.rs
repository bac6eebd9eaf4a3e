//! Predicate compiler.
//!
//! Turns a [`Clause`] into an engine [`Predicate`]. Keys of an object clause
//! are resolved in this order:
//!
//! 1. `$and`, `$or` and `$not` combine nested clauses.
//! 2. Any other key names a column, possibly through a dotted path of
//!    relationships (`owner.name`), or a relationship whose value is a
//!    clause over the related table.
//! 3. A column's value is either an object of operators, applied to that
//!    column, or a plain value compared for equality (`null` tests for
//!    null).
//!
//! Unknown columns and relationships are dropped with a warning. Sibling
//! keys are conjoined.

use crate::alias::AliasGraph;
use crate::clause::Clause;
use crate::codec::encode_operand;
use crate::schema::{ColumnType, SchemaRegistry, TableSchema};
use lumen_core::{Error, Result, Value};
use lumen_query::ast::{ColumnRef, CompareOp, Operand, Pattern, Predicate};
use std::fmt;
use std::rc::Rc;

/// A problem the compiler skipped over instead of failing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileWarning {
    pub message: String,
}

impl CompileWarning {
    /// Creates the warning and logs it.
    pub(crate) fn new(message: String) -> Self {
        log::warn!("{}", message);
        Self { message }
    }
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Filter operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    And,
    Or,
    Not,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Match,
    NotMatch,
    Between,
    Has,
    In,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Parses an operator key.
    pub fn parse(key: &str) -> Option<Self> {
        let op = match key {
            "$and" => Operator::And,
            "$or" => Operator::Or,
            "$not" => Operator::Not,
            "$ne" => Operator::Ne,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$match" => Operator::Match,
            "$notMatch" => Operator::NotMatch,
            "$between" => Operator::Between,
            "$has" => Operator::Has,
            "$in" => Operator::In,
            "$isNull" => Operator::IsNull,
            "$isNotNull" => Operator::IsNotNull,
            _ => return None,
        };
        Some(op)
    }

    /// Whether the operator combines nested clauses.
    pub fn is_compound(self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Not)
    }

    fn compare_op(self) -> Option<CompareOp> {
        match self {
            Operator::Ne => Some(CompareOp::Ne),
            Operator::Lt => Some(CompareOp::Lt),
            Operator::Lte => Some(CompareOp::Le),
            Operator::Gt => Some(CompareOp::Gt),
            Operator::Gte => Some(CompareOp::Ge),
            _ => None,
        }
    }
}

/// Conjoins predicates, `None` when there are none.
pub fn conjoin(predicates: Vec<Predicate>) -> Option<Predicate> {
    if predicates.is_empty() {
        None
    } else {
        Some(Predicate::and(predicates))
    }
}

/// Compiles clauses against the aliases of one query.
pub struct PredicateCompiler<'a> {
    registry: &'a SchemaRegistry,
    aliases: &'a AliasGraph,
    warnings: Vec<CompileWarning>,
}

impl<'a> PredicateCompiler<'a> {
    pub fn new(registry: &'a SchemaRegistry, aliases: &'a AliasGraph) -> Self {
        Self {
            registry,
            aliases,
            warnings: Vec::new(),
        }
    }

    /// Compiles a clause scoped to the root alias.
    pub fn compile(&mut self, clause: &Clause) -> Result<Option<Predicate>> {
        let root = self.aliases.root().to_string();
        self.compile_in(&root, clause)
    }

    /// Compiles a clause scoped to `alias`.
    pub fn compile_in(&mut self, alias: &str, clause: &Clause) -> Result<Option<Predicate>> {
        let entries = clause
            .entries()
            .ok_or_else(|| Error::invalid_query("a filter must be an object"))?;
        Ok(conjoin(self.compile_entries(alias, &entries)?))
    }

    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<CompileWarning> {
        self.warnings
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(CompileWarning::new(message));
    }

    fn schema_of(&self, alias: &str) -> Result<Rc<TableSchema>> {
        let table = self
            .aliases
            .table_of(alias)
            .ok_or_else(|| Error::invalid_query(format!("unknown alias {}", alias)))?;
        self.registry.table(table)
    }

    fn compile_entries(&mut self, alias: &str, entries: &[(String, Clause)]) -> Result<Vec<Predicate>> {
        let mut out = Vec::new();
        for (key, value) in entries {
            match Operator::parse(key) {
                Some(Operator::And) => out.extend(self.compile_all(alias, value)?),
                Some(Operator::Or) => out.extend(self.compile_any(alias, value)?),
                Some(Operator::Not) => {
                    if let Some(inner) = conjoin(self.compile_all(alias, value)?) {
                        out.push(Predicate::not(inner));
                    }
                }
                Some(_) => self.warn(format!(
                    "operator {} is not applied to a column of {}",
                    key, alias
                )),
                None => out.extend(self.compile_key(alias, key, value)?),
            }
        }
        Ok(out)
    }

    /// Every entry or item of `value`, as conjuncts.
    fn compile_all(&mut self, alias: &str, value: &Clause) -> Result<Vec<Predicate>> {
        if let Some(entries) = value.entries() {
            return self.compile_entries(alias, &entries);
        }
        let mut out = Vec::new();
        for item in value.items() {
            if let Some(p) = conjoin(self.compile_all(alias, &item)?) {
                out.push(p);
            }
        }
        Ok(out)
    }

    /// Every entry or item of `value`, as one disjunction.
    fn compile_any(&mut self, alias: &str, value: &Clause) -> Result<Option<Predicate>> {
        let mut branches = Vec::new();
        match value.entries() {
            Some(entries) => {
                for entry in entries {
                    if let Some(p) = conjoin(self.compile_entries(alias, &[entry])?) {
                        branches.push(p);
                    }
                }
            }
            None => {
                for item in value.items() {
                    if let Some(p) = conjoin(self.compile_all(alias, &item)?) {
                        branches.push(p);
                    }
                }
            }
        }
        Ok((!branches.is_empty()).then(|| Predicate::or(branches)))
    }

    fn compile_key(&mut self, alias: &str, key: &str, value: &Clause) -> Result<Vec<Predicate>> {
        let mut segments: Vec<&str> = key.split('.').collect();
        let last = segments.pop().unwrap_or(key);
        let mut current = alias.to_string();
        for segment in segments {
            match self.aliases.child(&current, segment) {
                Some(child) => current = child.to_string(),
                None => {
                    self.warn(format!(
                        "{} is not a joined relationship of {}, dropping {}",
                        segment, current, key
                    ));
                    return Ok(Vec::new());
                }
            }
        }

        let schema = self.schema_of(&current)?;
        if let Some(def) = schema.column(last) {
            let column = ColumnRef::new(current, last);
            return self.compile_column(&column, def.column_type, value);
        }
        if let (Some(child), Some(entries)) = (self.aliases.child(&current, last), value.entries()) {
            let child = child.to_string();
            return self.compile_entries(&child, &entries);
        }
        self.warn(format!(
            "column {} does not exist on {}, dropping it from the filter",
            key,
            schema.name()
        ));
        Ok(Vec::new())
    }

    fn compile_column(
        &mut self,
        column: &ColumnRef,
        column_type: ColumnType,
        value: &Clause,
    ) -> Result<Vec<Predicate>> {
        if let Some(entries) = value.entries() {
            let mut out = Vec::new();
            for (key, arg) in entries {
                match Operator::parse(&key) {
                    Some(op) => {
                        if let Some(p) = self.apply(column, column_type, op, &arg)? {
                            out.push(p);
                        }
                    }
                    None => self.warn(format!("unknown operator {} on {}", key, column)),
                }
            }
            return Ok(out);
        }
        let predicate = match value {
            Clause::Pattern(regex) => Predicate::Match {
                column: column.clone(),
                pattern: Pattern::new(regex.as_str())?,
                negated: false,
            },
            Clause::Column(other) => {
                Predicate::columns_eq(column.clone(), ColumnRef::new(&other.alias, &other.column))
            }
            Clause::Scalar(serde_json::Value::Null) => Predicate::IsNull {
                column: column.clone(),
                negated: false,
            },
            Clause::Scalar(raw) => Predicate::eq(column.clone(), encode_operand(column_type, raw)),
            Clause::Object(_) | Clause::List(_) => {
                return Err(Error::invalid_query(format!(
                    "{} cannot be compared with a list",
                    column
                )))
            }
        };
        Ok(vec![predicate])
    }

    fn apply(
        &mut self,
        column: &ColumnRef,
        column_type: ColumnType,
        op: Operator,
        arg: &Clause,
    ) -> Result<Option<Predicate>> {
        let predicate = match op {
            Operator::And => {
                let mut parts = Vec::new();
                for item in arg.items() {
                    parts.extend(self.compile_column(column, column_type, &item)?);
                }
                conjoin(parts)
            }
            Operator::Or => {
                let branches = match arg.entries() {
                    Some(entries) => entries
                        .into_iter()
                        .map(|entry| Clause::Object(vec![entry]))
                        .collect(),
                    None => arg.items(),
                };
                let mut out = Vec::new();
                for branch in branches {
                    if let Some(p) = conjoin(self.compile_column(column, column_type, &branch)?) {
                        out.push(p);
                    }
                }
                (!out.is_empty()).then(|| Predicate::or(out))
            }
            Operator::Not => {
                conjoin(self.compile_column(column, column_type, arg)?).map(Predicate::not)
            }
            Operator::Ne | Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                let op = op
                    .compare_op()
                    .ok_or_else(|| Error::invalid_query("not a comparison"))?;
                Some(Predicate::Compare {
                    column: column.clone(),
                    op,
                    operand: operand(column, column_type, arg)?,
                })
            }
            Operator::Match | Operator::NotMatch => Some(Predicate::Match {
                column: column.clone(),
                pattern: pattern(column, arg)?,
                negated: op == Operator::NotMatch,
            }),
            Operator::Between => {
                let bounds = arg.items();
                match bounds.as_slice() {
                    [low, high] => Some(Predicate::Between {
                        column: column.clone(),
                        low: literal(column, column_type, low)?,
                        high: literal(column, column_type, high)?,
                    }),
                    _ => {
                        return Err(Error::invalid_query(format!(
                            "$between on {} takes two bounds",
                            column
                        )))
                    }
                }
            }
            Operator::Has => {
                let element = match arg {
                    Clause::Scalar(serde_json::Value::String(s)) => s.clone(),
                    Clause::Scalar(other) if !other.is_null() => other.to_string(),
                    _ => {
                        return Err(Error::invalid_query(format!(
                            "$has on {} takes a scalar",
                            column
                        )))
                    }
                };
                Some(Predicate::Match {
                    column: column.clone(),
                    pattern: Pattern::new(&format!("({}\\b)", regex::escape(&element)))?,
                    negated: false,
                })
            }
            Operator::In => {
                let values = arg
                    .items()
                    .iter()
                    .map(|item| literal(column, column_type, item))
                    .collect::<Result<Vec<_>>>()?;
                Some(Predicate::in_list(column.clone(), values))
            }
            Operator::IsNull | Operator::IsNotNull => {
                let flipped = matches!(arg, Clause::Scalar(serde_json::Value::Bool(false)));
                Some(Predicate::IsNull {
                    column: column.clone(),
                    negated: (op == Operator::IsNotNull) != flipped,
                })
            }
        };
        Ok(predicate)
    }
}

fn literal(column: &ColumnRef, column_type: ColumnType, arg: &Clause) -> Result<Value> {
    match arg {
        Clause::Scalar(raw) => Ok(encode_operand(column_type, raw)),
        _ => Err(Error::invalid_query(format!(
            "operand of {} must be a value",
            column
        ))),
    }
}

fn operand(column: &ColumnRef, column_type: ColumnType, arg: &Clause) -> Result<Operand> {
    match arg {
        Clause::Column(other) => Ok(Operand::Column(ColumnRef::new(&other.alias, &other.column))),
        other => literal(column, column_type, other).map(Operand::Value),
    }
}

fn pattern(column: &ColumnRef, arg: &Clause) -> Result<Pattern> {
    match arg {
        Clause::Pattern(regex) => Pattern::new(regex.as_str()),
        Clause::Scalar(serde_json::Value::String(source)) => Pattern::new(source),
        _ => Err(Error::invalid_query(format!(
            "pattern operand of {} must be a regex or a string",
            column
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, RelationshipDef, SchemaDef};
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .define(
                "post",
                SchemaDef::new()
                    .column("_id", ColumnDef::new(ColumnType::String).primary_key())
                    .column("title", ColumnDef::new(ColumnType::String))
                    .column("views", ColumnDef::new(ColumnType::Integer))
                    .column("ownerId", ColumnDef::new(ColumnType::String))
                    .column("tags", ColumnDef::new(ColumnType::LiteralArray))
                    .column("created", ColumnDef::new(ColumnType::DateTime))
                    .relationship(
                        "owner",
                        RelationshipDef::one_to_one("user", |user| {
                            Ok(Clause::object([("ownerId", user.column("_id")?)]))
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
    }

    fn aliases() -> AliasGraph {
        let mut graph = AliasGraph::new("post@0", "post");
        graph.add("user@0", "user");
        graph.link("post@0", "owner", "user@0");
        graph
    }

    fn col(alias: &str, column: &str) -> ColumnRef {
        ColumnRef::new(alias, column)
    }

    fn compile(clause: serde_json::Value) -> (Option<Predicate>, Vec<CompileWarning>) {
        let registry = registry();
        let graph = aliases();
        let mut compiler = PredicateCompiler::new(&registry, &graph);
        let predicate = compiler.compile(&Clause::from(clause)).unwrap();
        (predicate, compiler.into_warnings())
    }

    #[test]
    fn test_equality_and_null() {
        let (p, _) = compile(json!({ "title": "hello" }));
        assert_eq!(p, Some(Predicate::eq(col("post@0", "title"), "hello")));

        let (p, _) = compile(json!({ "title": null }));
        assert_eq!(
            p,
            Some(Predicate::IsNull {
                column: col("post@0", "title"),
                negated: false
            })
        );
    }

    #[test]
    fn test_operators_on_column() {
        let (p, _) = compile(json!({ "views": { "$gte": 3, "$lt": 10 } }));
        assert_eq!(
            p,
            Some(Predicate::and(vec![
                Predicate::compare(col("post@0", "views"), CompareOp::Ge, 3i64),
                Predicate::compare(col("post@0", "views"), CompareOp::Lt, 10i64),
            ]))
        );
    }

    #[test]
    fn test_or_accepts_object_and_array() {
        let expected = Some(Predicate::or(vec![
            Predicate::eq(col("post@0", "title"), "a"),
            Predicate::eq(col("post@0", "views"), 1i64),
        ]));
        let (p, _) = compile(json!({ "$or": { "title": "a", "views": 1 } }));
        assert_eq!(p, expected);
        let (p, _) = compile(json!({ "$or": [{ "title": "a" }, { "views": 1 }] }));
        assert_eq!(p, expected);
    }

    #[test]
    fn test_not() {
        let (p, _) = compile(json!({ "$not": { "title": "a" } }));
        assert_eq!(
            p,
            Some(Predicate::not(Predicate::eq(col("post@0", "title"), "a")))
        );
    }

    #[test]
    fn test_dotted_path_and_relation_scope() {
        let expected = Some(Predicate::eq(col("user@0", "name"), "ann"));
        let (p, _) = compile(json!({ "owner.name": "ann" }));
        assert_eq!(p, expected);
        let (p, _) = compile(json!({ "owner": { "name": "ann" } }));
        assert_eq!(p, expected);
    }

    #[test]
    fn test_unknown_column_warns_once_and_drops() {
        let (p, warnings) = compile(json!({ "title": "a", "missing": 1 }));
        assert_eq!(p, Some(Predicate::eq(col("post@0", "title"), "a")));
        assert_eq!(warnings.len(), 1);

        let (p, warnings) = compile(json!({ "missing": 1 }));
        assert_eq!(p, None);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_has_matches_literal_array_element() {
        let (p, _) = compile(json!({ "tags": { "$has": "a.b" } }));
        match p {
            Some(Predicate::Match { pattern, negated, .. }) => {
                assert!(!negated);
                assert_eq!(pattern.as_str(), "(a\\.b\\b)");
                assert!(pattern.is_match("x|a.b|y"));
                assert!(!pattern.is_match("x|aXb"));
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_date_operands_compare_as_millis() {
        let (p, _) = compile(json!({ "created": { "$gt": "2020-01-01" } }));
        assert_eq!(
            p,
            Some(Predicate::compare(
                col("post@0", "created"),
                CompareOp::Gt,
                Value::DateTime(1_577_836_800_000)
            ))
        );
    }

    #[test]
    fn test_between_in_and_null_tests() {
        let (p, _) = compile(json!({
            "views": { "$between": [1, 5], "$in": [7, 8], "$isNotNull": true }
        }));
        assert_eq!(
            p,
            Some(Predicate::and(vec![
                Predicate::Between {
                    column: col("post@0", "views"),
                    low: Value::Int64(1),
                    high: Value::Int64(5),
                },
                Predicate::in_list(col("post@0", "views"), vec![Value::Int64(7), Value::Int64(8)]),
                Predicate::IsNull {
                    column: col("post@0", "views"),
                    negated: true
                },
            ]))
        );
    }

    #[test]
    fn test_malformed_operands_fail() {
        let registry = registry();
        let graph = aliases();
        let mut compiler = PredicateCompiler::new(&registry, &graph);
        let bad = Clause::from(json!({ "views": { "$between": [1] } }));
        assert!(matches!(
            compiler.compile(&bad),
            Err(Error::InvalidQuery { .. })
        ));
        let not_object = Clause::from(json!(3));
        assert!(compiler.compile(&not_object).is_err());
    }

    #[test]
    fn test_column_handle_operand() {
        let registry = registry();
        let graph = aliases();
        let handle = TableHandleFixture::user(&registry);
        let clause = Clause::object([("ownerId", handle)]);
        let mut compiler = PredicateCompiler::new(&registry, &graph);
        assert_eq!(
            compiler.compile(&clause).unwrap(),
            Some(Predicate::columns_eq(
                col("post@0", "ownerId"),
                col("user@0", "_id")
            ))
        );
    }

    struct TableHandleFixture;

    impl TableHandleFixture {
        fn user(registry: &SchemaRegistry) -> Clause {
            crate::schema::TableHandle::new("user@0", registry.table("user").unwrap())
                .column("_id")
                .unwrap()
        }
    }
}
