//! Nested loop left outer join.

use crate::ast::{Predicate, TableRef};
use crate::executor::{JoinedRow, Relation};
use lumen_core::schema::Table;
use lumen_core::{Result, Row};
use std::rc::Rc;

/// Left outer nested loop join.
///
/// Compares every left entry with every right row. Left entries without any
/// match are kept with an empty slot for the joined alias.
pub struct NestedLoopJoin {
    on: Option<Predicate>,
}

impl NestedLoopJoin {
    /// Creates a join with an optional condition.
    pub fn new(on: Option<Predicate>) -> Self {
        Self { on }
    }

    /// Joins `rows` of `table` under the alias of `table_ref`.
    pub fn execute(
        &self,
        left: Relation,
        table_ref: &TableRef,
        table: Table,
        rows: Vec<Rc<Row>>,
    ) -> Result<Relation> {
        let Relation { mut scope, entries } = left;
        scope.bind(table_ref, table)?;
        if let Some(on) = &self.on {
            scope.check(on.columns())?;
        }

        let mut result = Vec::with_capacity(entries.len());
        for entry in &entries {
            let mut matched = false;
            for row in &rows {
                let candidate = entry.extend(Some(row.clone()));
                let keep = match &self.on {
                    Some(on) => on.eval(&scope.tuple(&candidate)),
                    None => true,
                };
                if keep {
                    matched = true;
                    result.push(candidate);
                }
            }
            if !matched {
                result.push(entry.extend(None));
            }
        }

        Ok(Relation {
            scope,
            entries: result,
        })
    }
}
