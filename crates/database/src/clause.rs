//! Declarative filter descriptions.
//!
//! A [`Clause`] is what applications write as a `where` argument and what
//! relationship join builders return. Most clauses come straight from JSON;
//! column handles and compiled regexes can only be built in code.

use crate::schema::ColumnType;
use lumen_core::{Error, Result};
use regex::Regex;

/// A column of an aliased table, referenced from inside a clause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnHandle {
    pub alias: String,
    pub column: String,
    pub column_type: ColumnType,
}

/// A filter description.
#[derive(Clone, Debug)]
pub enum Clause {
    /// A JSON value. Arrays are operator arguments (`$in`, `$between`,
    /// `$or`), everything else is compared for equality.
    Scalar(serde_json::Value),
    /// Another column; compiles to a column-to-column comparison.
    Column(ColumnHandle),
    /// A regular expression; compiles to a match.
    Pattern(Regex),
    /// Keys are operators, column paths or relationship names.
    Object(Vec<(String, Clause)>),
    /// A list of clauses, for operator arguments that mix in handles or
    /// patterns.
    List(Vec<Clause>),
}

impl Clause {
    /// Builds an object clause.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Clause)>,
    {
        Clause::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Compiles a regular expression clause.
    pub fn pattern(source: &str) -> Result<Self> {
        Regex::new(source)
            .map(Clause::Pattern)
            .map_err(|e| Error::invalid_query(format!("invalid pattern {:?}: {}", source, e)))
    }

    /// Items of a list argument. A JSON array expands to one clause per
    /// element; any other clause is a single item.
    pub fn items(&self) -> Vec<Clause> {
        match self {
            Clause::List(items) => items.clone(),
            Clause::Scalar(serde_json::Value::Array(items)) => {
                items.iter().cloned().map(Clause::from).collect()
            }
            other => vec![other.clone()],
        }
    }

    /// Entries of an object clause, with JSON objects expanded.
    pub fn entries(&self) -> Option<Vec<(String, Clause)>> {
        match self {
            Clause::Object(entries) => Some(entries.clone()),
            Clause::Scalar(serde_json::Value::Object(map)) => Some(
                map.iter()
                    .map(|(k, v)| (k.clone(), Clause::from(v.clone())))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Clause {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Clause::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Clause::from(v)))
                    .collect(),
            ),
            other => Clause::Scalar(other),
        }
    }
}

impl From<ColumnHandle> for Clause {
    fn from(handle: ColumnHandle) -> Self {
        Clause::Column(handle)
    }
}

impl From<Regex> for Clause {
    fn from(regex: Regex) -> Self {
        Clause::Pattern(regex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_nests_objects() {
        let clause = Clause::from(json!({ "title": { "$ne": "a" }, "views": 3 }));
        let entries = clause.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .any(|(k, v)| k == "title" && matches!(v, Clause::Object(_))));
        assert!(entries
            .iter()
            .any(|(k, v)| k == "views" && matches!(v, Clause::Scalar(_))));
    }

    #[test]
    fn test_items() {
        let clause = Clause::from(json!([1, { "a": 2 }]));
        let items = clause.items();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Clause::Object(_)));
        assert_eq!(Clause::from(json!(5)).items().len(), 1);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(Clause::pattern("(").is_err());
        assert!(matches!(Clause::pattern("^a").unwrap(), Clause::Pattern(_)));
    }
}
