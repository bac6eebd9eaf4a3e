//! Change set for routing commits to dependent queries.

use std::collections::BTreeSet;

/// The tables written by one committed transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    tables: BTreeSet<String>,
}

impl ChangeSet {
    /// Creates a new empty change set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a write to a table.
    pub fn touch(&mut self, table: impl Into<String>) {
        self.tables.insert(table.into());
    }

    /// Whether any of the given tables was written.
    pub fn touches<S: AsRef<str>>(&self, tables: &[S]) -> bool {
        tables.iter().any(|t| self.tables.contains(t.as_ref()))
    }

    /// Whether nothing was written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterates the written tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().map(Into::into).collect(),
        }
    }
}
