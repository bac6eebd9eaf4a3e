//! Stored rows.

use crate::value::Value;

/// Store-local identifier for a row. Ids grow monotonically, so ascending id
/// order is insertion order.
pub type RowId = u64;

/// One stored row: its id and one value per column, in column order.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    id: RowId,
    values: Vec<Value>,
}

impl Row {
    pub fn new(id: RowId, values: Vec<Value>) -> Self {
        Self { id, values }
    }

    #[inline]
    pub fn id(&self) -> RowId {
        self.id
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at a column position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The values of this row with some positions replaced. Positions past
    /// the end are ignored.
    pub fn patched(&self, changes: &[(usize, Value)]) -> Vec<Value> {
        let mut values = self.values.clone();
        for (index, value) in changes {
            if let Some(slot) = values.get_mut(*index) {
                *slot = value.clone();
            }
        }
        values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}
