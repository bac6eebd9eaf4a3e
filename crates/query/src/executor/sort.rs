//! Sort executor.

use crate::ast::{OrderBy, SortOrder};
use crate::executor::{JoinedRow, Relation};
use core::cmp::Ordering;
use lumen_core::Result;

/// Sort executor - stable sort by a list of ordering terms.
pub struct SortExecutor {
    order_by: Vec<OrderBy>,
}

impl SortExecutor {
    /// Creates a new sort executor.
    pub fn new(order_by: Vec<OrderBy>) -> Self {
        Self { order_by }
    }

    /// Executes the sort on the input relation. Ties keep input order.
    pub fn execute(&self, mut input: Relation) -> Result<Relation> {
        if self.order_by.is_empty() {
            return Ok(input);
        }
        let keys = self
            .order_by
            .iter()
            .map(|term| Ok((input.scope.resolve(&term.column)?, term.order)))
            .collect::<Result<Vec<_>>>()?;
        input
            .entries
            .sort_by(|a, b| compare_entries(&keys, a, b));
        Ok(input)
    }
}

fn compare_entries(keys: &[((usize, usize), SortOrder)], a: &JoinedRow, b: &JoinedRow) -> Ordering {
    for ((slot, index), order) in keys {
        // A missing joined row sorts like null, first.
        let cmp = match (a.get(*slot, *index), b.get(*slot, *index)) {
            (Some(av), Some(bv)) => av.cmp(bv),
            (None, Some(bv)) if bv.is_null() => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(av), None) if av.is_null() => Ordering::Equal,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if cmp != Ordering::Equal {
            return match order {
                SortOrder::Asc => cmp,
                SortOrder::Desc => cmp.reverse(),
            };
        }
    }
    Ordering::Equal
}
