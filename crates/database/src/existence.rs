//! Optimistic existence cache.
//!
//! Remembers which primary keys the database has written, so an upsert can
//! choose between insert and update without reading the engine first. The
//! cache is updated before a write is submitted; every update returns a
//! [`CacheRollback`] that restores the previous membership if the write
//! fails.

use core::fmt;
use hashbrown::HashSet;
use lumen_core::Value;

/// A row identity: table plus primary key value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub table: String,
    pub key: Value,
}

impl Identifier {
    pub fn new(table: impl Into<String>, key: Value) -> Self {
        Self {
            table: table.into(),
            key,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.table, self.key)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Effect {
    Added(Identifier),
    Removed(Identifier),
}

/// Undo record of cache updates. Only identifiers whose membership actually
/// changed are recorded.
#[must_use = "a cache rollback must be kept until the write it covers has committed"]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheRollback {
    effects: Vec<Effect>,
}

impl CacheRollback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the effects of a later update.
    pub fn merge(&mut self, later: CacheRollback) {
        self.effects.extend(later.effects);
    }

    /// Whether the update changed nothing.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Number of membership changes recorded.
    pub fn len(&self) -> usize {
        self.effects.len()
    }
}

/// The set of identifiers known to exist.
#[derive(Clone, Debug, Default)]
pub struct ExistenceCache {
    known: HashSet<Identifier>,
}

impl ExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.known.contains(id)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Marks identifiers as existing.
    pub fn insert_all<I>(&mut self, ids: I) -> CacheRollback
    where
        I: IntoIterator<Item = Identifier>,
    {
        let effects = ids
            .into_iter()
            .filter_map(|id| {
                if self.known.insert(id.clone()) {
                    Some(Effect::Added(id))
                } else {
                    None
                }
            })
            .collect();
        CacheRollback { effects }
    }

    /// Marks identifiers as gone.
    pub fn remove_all<I>(&mut self, ids: I) -> CacheRollback
    where
        I: IntoIterator<Item = Identifier>,
    {
        let effects = ids
            .into_iter()
            .filter_map(|id| self.known.take(&id).map(Effect::Removed))
            .collect();
        CacheRollback { effects }
    }

    /// Undoes the updates recorded in `rollback`, latest first.
    pub fn rollback(&mut self, rollback: CacheRollback) {
        log::trace!("rolling back {} cache change(s)", rollback.len());
        for effect in rollback.effects.into_iter().rev() {
            match effect {
                Effect::Added(id) => {
                    self.known.remove(&id);
                }
                Effect::Removed(id) => {
                    self.known.insert(id);
                }
            }
        }
    }

    /// Forgets every identifier.
    pub fn clear(&mut self) {
        self.known.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(key: i64) -> Identifier {
        Identifier::new("post", Value::Int64(key))
    }

    fn snapshot(cache: &ExistenceCache) -> Vec<i64> {
        let mut keys: Vec<i64> = cache.known.iter().filter_map(|i| i.key.as_i64()).collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn test_rollback_only_undoes_actual_changes() {
        let mut cache = ExistenceCache::new();
        let _ = cache.insert_all([id(1)]);
        let rollback = cache.insert_all([id(1), id(2)]);
        assert_eq!(rollback.len(), 1);
        cache.rollback(rollback);
        assert!(cache.contains(&id(1)));
        assert!(!cache.contains(&id(2)));
    }

    #[test]
    fn test_merged_rollbacks_undo_in_reverse() {
        let mut cache = ExistenceCache::new();
        let mut rollback = cache.insert_all([id(1)]);
        rollback.merge(cache.remove_all([id(1)]));
        rollback.merge(cache.insert_all([id(1)]));
        cache.rollback(rollback);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_identifier_display() {
        assert_eq!(id(3).to_string(), "post@3");
        assert_eq!(
            Identifier::new("user", Value::from("u1")),
            Identifier::new("user", Value::from("u1"))
        );
    }

    proptest! {
        #[test]
        fn prop_rollback_restores_membership(
            initial in proptest::collection::vec(0i64..20, 0..10),
            ops in proptest::collection::vec((any::<bool>(), proptest::collection::vec(0i64..20, 0..5)), 0..10),
        ) {
            let mut cache = ExistenceCache::new();
            let _ = cache.insert_all(initial.iter().map(|k| id(*k)));
            let before = snapshot(&cache);

            let mut rollback = CacheRollback::new();
            for (insert, keys) in ops {
                let ids = keys.into_iter().map(id);
                let step = if insert { cache.insert_all(ids) } else { cache.remove_all(ids) };
                rollback.merge(step);
            }
            cache.rollback(rollback);
            prop_assert_eq!(snapshot(&cache), before);
        }
    }
}
