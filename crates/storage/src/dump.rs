//! Serializable snapshot of every table.

use lumen_core::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row as column name to value.
pub type DumpRow = BTreeMap<String, Value>;

/// Rows of every table in insertion order, keyed by table name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dump {
    pub tables: BTreeMap<String, Vec<DumpRow>>,
}

impl Dump {
    /// Total number of rows.
    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}
