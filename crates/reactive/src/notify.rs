//! Query registry and notification system.
//!
//! This module provides `QueryRegistry` which tracks observers by the tables
//! they read and routes committed change sets to them.

use crate::change_set::ChangeSet;
use crate::subscription::SubscriptionManager;
use hashbrown::HashMap;
use std::rc::Rc;

/// Unique identifier for a registered query observer.
pub type QueryId = u64;

/// A registry that tracks query observers and routes changes to them.
///
/// The registry maintains a mapping from table names to the observers that
/// depend on them. A change set selects every observer depending on any
/// table it touched.
#[derive(Default)]
pub struct QueryRegistry {
    /// Table name -> observers reading it
    table_queries: HashMap<String, Vec<QueryId>>,
    /// Observer callbacks
    observers: SubscriptionManager<ChangeSet>,
}

impl QueryRegistry {
    /// Creates a new query registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer of the given tables and returns its ID.
    pub fn register<S, F>(&mut self, tables: &[S], callback: F) -> QueryId
    where
        S: AsRef<str>,
        F: Fn(&ChangeSet) + 'static,
    {
        let id = self.observers.subscribe(callback);
        for table in tables {
            let ids = self.table_queries.entry(table.as_ref().to_string()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        id
    }

    /// Unregisters an observer by ID.
    ///
    /// Returns true if the observer was found and removed.
    pub fn unregister(&mut self, id: QueryId) -> bool {
        if !self.observers.unsubscribe(id) {
            return false;
        }
        self.table_queries.retain(|_, ids| {
            ids.retain(|q| *q != id);
            !ids.is_empty()
        });
        true
    }

    /// Returns the callbacks of every observer affected by a change set, in
    /// registration order, each paired with its ID.
    pub fn affected(&self, changes: &ChangeSet) -> Vec<(QueryId, Rc<dyn Fn(&ChangeSet)>)> {
        let mut ids: Vec<QueryId> = changes
            .tables()
            .filter_map(|t| self.table_queries.get(t))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .filter_map(|id| self.observers.callback(id).map(|cb| (id, cb)))
            .collect()
    }

    /// Returns the number of registered observers.
    pub fn query_count(&self) -> usize {
        self.observers.len()
    }

    /// Returns true if there are no registered observers.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Returns the number of observers depending on a table.
    pub fn queries_for_table(&self, table: &str) -> usize {
        self.table_queries.get(table).map(Vec::len).unwrap_or(0)
    }

    /// Removes every observer.
    pub fn clear(&mut self) {
        self.table_queries.clear();
        self.observers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing() {
        let mut registry = QueryRegistry::new();
        let a = registry.register(&["post", "user"], |_| {});
        let b = registry.register(&["user"], |_| {});
        let c = registry.register(&["tag"], |_| {});

        let changes: ChangeSet = ["user", "post"].into_iter().collect();
        let ids: Vec<_> = registry.affected(&changes).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(registry.queries_for_table("user"), 2);
        assert!(!ids.contains(&c));
    }

    #[test]
    fn test_unregister() {
        let mut registry = QueryRegistry::new();
        let a = registry.register(&["post"], |_| {});
        assert_eq!(registry.query_count(), 1);
        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        assert_eq!(registry.queries_for_table("post"), 0);
        assert!(registry.is_empty());
        let changes: ChangeSet = ["post"].into_iter().collect();
        assert!(registry.affected(&changes).is_empty());
    }
}
