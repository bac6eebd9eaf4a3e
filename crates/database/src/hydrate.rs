//! Graph hydration.
//!
//! A joined select returns flat rows in which every root entity repeats
//! once per related row. Hydration folds them back into nested JSON
//! objects following the [`Shape`] recorded by the query compiler.

use crate::codec::decode;
use crate::schema::ColumnType;
use hashbrown::HashMap;
use lumen_core::{Error, Result, Value};
use lumen_query::ast::ColumnRef;
use lumen_query::executor::ResultSet;
use serde_json::{Map, Value as Json};

/// Layout of one level of a result graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Shape {
    /// Primary key column; rows are grouped by it.
    pub primary: ColumnRef,
    /// Omit the primary key from the output objects.
    pub hide_primary: bool,
    /// Output keys in selection order. The primary key is always present.
    pub fields: Vec<(String, ShapeNode)>,
}

/// One key of a result object.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeNode {
    Field {
        column: ColumnRef,
        shadow: Option<ColumnRef>,
        column_type: ColumnType,
    },
    /// Related object, or `null` when nothing matched.
    One(Shape),
    /// Array of related objects.
    Many(Shape),
}

impl Shape {
    /// Every result column this shape reads.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = vec![&self.primary];
        for (_, node) in &self.fields {
            match node {
                ShapeNode::Field { column, shadow, .. } => {
                    out.push(column);
                    out.extend(shadow.iter());
                }
                ShapeNode::One(shape) | ShapeNode::Many(shape) => out.extend(shape.columns()),
            }
        }
        out
    }
}

/// Positions of shape columns in a result set.
struct Positions<'a> {
    index: HashMap<&'a ColumnRef, usize>,
}

impl<'a> Positions<'a> {
    fn new(result: &'a ResultSet) -> Self {
        let index = result
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c, i))
            .collect();
        Self { index }
    }

    fn position(&self, column: &ColumnRef) -> Result<usize> {
        self.index.get(column).copied().ok_or_else(|| {
            Error::invalid_query(format!("result has no column {}", column))
        })
    }

    fn value<'r>(&self, row: &'r [Value], column: &ColumnRef) -> Result<&'r Value> {
        let position = self.position(column)?;
        row.get(position)
            .ok_or_else(|| Error::invalid_query(format!("short result row at {}", column)))
    }
}

/// Builds nested objects from a joined result.
pub fn hydrate(result: &ResultSet, shape: &Shape) -> Result<Vec<Json>> {
    let positions = Positions::new(result);
    for column in shape.columns() {
        positions.position(column)?;
    }
    let rows: Vec<&[Value]> = result.rows.iter().map(Vec::as_slice).collect();
    build(&positions, &rows, shape)
}

fn build(positions: &Positions<'_>, rows: &[&[Value]], shape: &Shape) -> Result<Vec<Json>> {
    let mut order: Vec<Vec<&[Value]>> = Vec::new();
    let mut groups: HashMap<&Value, usize> = HashMap::new();
    for &row in rows {
        let key = positions.value(row, &shape.primary)?;
        // An outer join that matched nothing leaves the key null.
        if key.is_null() {
            continue;
        }
        match groups.get(key) {
            Some(&i) => order[i].push(row),
            None => {
                groups.insert(key, order.len());
                order.push(vec![row]);
            }
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for group in &order {
        let mut object = Map::new();
        for (key, node) in &shape.fields {
            let value = match node {
                ShapeNode::Field {
                    column,
                    shadow,
                    column_type,
                } => {
                    if shape.hide_primary && *column == shape.primary {
                        continue;
                    }
                    let first = group[0];
                    let shadow = match shadow {
                        Some(s) => Some(positions.value(first, s)?),
                        None => None,
                    };
                    decode(*column_type, positions.value(first, column)?, shadow)
                }
                ShapeNode::One(child) => build(positions, group, child)?
                    .into_iter()
                    .next()
                    .unwrap_or(Json::Null),
                ShapeNode::Many(child) => Json::Array(build(positions, group, child)?),
            };
            object.insert(key.clone(), value);
        }
        out.push(Json::Object(object));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(alias: &str, column: &str) -> ShapeNode {
        ShapeNode::Field {
            column: ColumnRef::new(alias, column),
            shadow: None,
            column_type: ColumnType::String,
        }
    }

    fn shape() -> Shape {
        Shape {
            primary: ColumnRef::new("post@0", "_id"),
            hide_primary: false,
            fields: vec![
                ("_id".into(), field("post@0", "_id")),
                (
                    "comments".into(),
                    ShapeNode::Many(Shape {
                        primary: ColumnRef::new("comment@0", "_id"),
                        hide_primary: true,
                        fields: vec![
                            ("_id".into(), field("comment@0", "_id")),
                            ("text".into(), field("comment@0", "text")),
                        ],
                    }),
                ),
            ],
        }
    }

    fn result(rows: Vec<Vec<Value>>) -> ResultSet {
        ResultSet {
            columns: vec![
                ColumnRef::new("post@0", "_id"),
                ColumnRef::new("comment@0", "_id"),
                ColumnRef::new("comment@0", "text"),
            ],
            rows,
        }
    }

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn test_groups_one_to_many_in_first_seen_order() {
        let result = result(vec![
            vec![s("p2"), s("c1"), s("x")],
            vec![s("p1"), Value::Null, Value::Null],
            vec![s("p2"), s("c2"), s("y")],
        ]);
        let out = hydrate(&result, &shape()).unwrap();
        assert_eq!(
            out,
            vec![
                json!({ "_id": "p2", "comments": [{ "text": "x" }, { "text": "y" }] }),
                json!({ "_id": "p1", "comments": [] }),
            ]
        );
    }

    #[test]
    fn test_one_to_one_null_when_unmatched() {
        let mut shape = shape();
        let child = match shape.fields.remove(1).1 {
            ShapeNode::Many(child) => child,
            _ => unreachable!(),
        };
        shape.fields.push(("comment".into(), ShapeNode::One(child)));
        let out = hydrate(
            &result(vec![vec![s("p1"), Value::Null, Value::Null]]),
            &shape,
        )
        .unwrap();
        assert_eq!(out, vec![json!({ "_id": "p1", "comment": null })]);
    }

    #[test]
    fn test_missing_column_is_invalid_query() {
        let mut result = result(Vec::new());
        result.columns.pop();
        assert!(matches!(
            hydrate(&result, &shape()),
            Err(Error::InvalidQuery { .. })
        ));
    }
}
