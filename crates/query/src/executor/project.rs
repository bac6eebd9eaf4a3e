//! Projection and distinct.

use crate::ast::ColumnRef;
use crate::executor::Relation;
use hashbrown::HashSet;
use lumen_core::{Result, Value};

/// Projects joined rows onto a list of columns.
pub struct ProjectExecutor {
    columns: Vec<ColumnRef>,
    distinct: bool,
}

impl ProjectExecutor {
    /// Creates a new project executor.
    pub fn new(columns: Vec<ColumnRef>, distinct: bool) -> Self {
        Self { columns, distinct }
    }

    /// Projects the relation. Missing joined rows project as null. With
    /// `distinct`, later duplicates of a projected row are dropped.
    pub fn execute(&self, input: &Relation) -> Result<Vec<Vec<Value>>> {
        let positions = self
            .columns
            .iter()
            .map(|c| input.scope.resolve(c))
            .collect::<Result<Vec<_>>>()?;

        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(input.len());
        for entry in &input.entries {
            let projected: Vec<Value> = positions
                .iter()
                .map(|(slot, index)| entry.get(*slot, *index).cloned().unwrap_or(Value::Null))
                .collect();
            if self.distinct && !seen.insert(projected.clone()) {
                continue;
            }
            rows.push(projected);
        }
        Ok(rows)
    }
}
