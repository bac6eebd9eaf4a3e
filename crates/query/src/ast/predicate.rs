//! Predicate algebra for query filtering and join conditions.

use crate::ast::expr::{ColumnRef, CompareOp, Operand};
use core::fmt;
use core::hash::{Hash, Hasher};
use lumen_core::{Error, Result, Value};
use regex::Regex;

/// A compiled regular expression compared by its source text.
#[derive(Clone, Debug)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compiles a pattern.
    pub fn new(source: &str) -> Result<Self> {
        Regex::new(source)
            .map(Pattern)
            .map_err(|e| Error::invalid_query(format!("invalid pattern /{}/: {}", source, e)))
    }

    /// Returns the pattern source.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Tests a string against the pattern.
    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern(regex)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl Hash for Pattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

/// Anything that can resolve a column reference to a value.
///
/// Joined rows, where an alias may be missing because an outer join found
/// no match, resolve to `None`; predicates treat that as null.
pub trait Tuple {
    fn value(&self, column: &ColumnRef) -> Option<&Value>;
}

/// A boolean expression over column references.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// `column op operand`
    Compare {
        column: ColumnRef,
        op: CompareOp,
        operand: Operand,
    },
    /// Regular expression match on a string column.
    Match {
        column: ColumnRef,
        pattern: Pattern,
        negated: bool,
    },
    /// Inclusive range test.
    Between {
        column: ColumnRef,
        low: Value,
        high: Value,
    },
    /// Membership test.
    In { column: ColumnRef, values: Vec<Value> },
    /// Null test.
    IsNull { column: ColumnRef, negated: bool },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Creates a comparison against a literal.
    pub fn compare(column: ColumnRef, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column,
            op,
            operand: Operand::Value(value.into()),
        }
    }

    /// Creates an equality comparison against a literal.
    pub fn eq(column: ColumnRef, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    /// Creates a comparison between two columns.
    pub fn columns_eq(left: ColumnRef, right: ColumnRef) -> Self {
        Predicate::Compare {
            column: left,
            op: CompareOp::Eq,
            operand: Operand::Column(right),
        }
    }

    /// Creates a membership test.
    pub fn in_list(column: ColumnRef, values: Vec<Value>) -> Self {
        Predicate::In { column, values }
    }

    /// Conjoins predicates. A single predicate is returned unwrapped.
    pub fn and(mut predicates: Vec<Predicate>) -> Self {
        if predicates.len() == 1 {
            predicates.remove(0)
        } else {
            Predicate::And(predicates)
        }
    }

    /// Disjoins predicates. A single predicate is returned unwrapped.
    pub fn or(mut predicates: Vec<Predicate>) -> Self {
        if predicates.len() == 1 {
            predicates.remove(0)
        } else {
            Predicate::Or(predicates)
        }
    }

    /// Negates a predicate.
    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not(Box::new(predicate))
    }

    /// Returns every column referenced by this predicate, operands included.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Predicate::Compare {
                column, operand, ..
            } => {
                out.push(column);
                if let Operand::Column(other) = operand {
                    out.push(other);
                }
            }
            Predicate::Match { column, .. }
            | Predicate::Between { column, .. }
            | Predicate::In { column, .. }
            | Predicate::IsNull { column, .. } => out.push(column),
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.collect_columns(out);
                }
            }
            Predicate::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Evaluates the predicate. Any comparison involving null is false.
    pub fn eval<T: Tuple + ?Sized>(&self, tuple: &T) -> bool {
        match self {
            Predicate::Compare {
                column,
                op,
                operand,
            } => {
                let left = match non_null(tuple.value(column)) {
                    Some(v) => v,
                    None => return false,
                };
                let right = match operand {
                    Operand::Value(v) => non_null(Some(v)),
                    Operand::Column(c) => non_null(tuple.value(c)),
                };
                match right {
                    Some(right) => op.test(left.cmp(right)),
                    None => false,
                }
            }
            Predicate::Match {
                column,
                pattern,
                negated,
            } => match non_null(tuple.value(column)) {
                Some(Value::String(s)) => pattern.is_match(s) != *negated,
                Some(_) => *negated,
                None => false,
            },
            Predicate::Between { column, low, high } => match non_null(tuple.value(column)) {
                Some(v) => v >= low && v <= high,
                None => false,
            },
            Predicate::In { column, values } => match non_null(tuple.value(column)) {
                Some(v) => values.iter().any(|candidate| candidate == v),
                None => false,
            },
            Predicate::IsNull { column, negated } => {
                non_null(tuple.value(column)).is_none() == !*negated
            }
            Predicate::And(children) => children.iter().all(|p| p.eval(tuple)),
            Predicate::Or(children) => children.iter().any(|p| p.eval(tuple)),
            Predicate::Not(inner) => !inner.eval(tuple),
        }
    }
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", part)?;
    }
    write!(f, ")")
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare {
                column,
                op,
                operand,
            } => write!(f, "{} {} {}", column, op, operand),
            Predicate::Match {
                column,
                pattern,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}MATCH /{}/", column, not, pattern.as_str())
            }
            Predicate::Between { column, low, high } => {
                write!(f, "{} BETWEEN {} AND {}", column, low, high)
            }
            Predicate::In { column, values } => {
                write!(f, "{} IN (", column)?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            Predicate::IsNull { column, negated } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} IS {}NULL", column, not)
            }
            Predicate::And(children) => write_joined(f, children, "AND"),
            Predicate::Or(children) => write_joined(f, children, "OR"),
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    struct MapTuple(HashMap<ColumnRef, Value>);

    impl Tuple for MapTuple {
        fn value(&self, column: &ColumnRef) -> Option<&Value> {
            self.0.get(column)
        }
    }

    fn col(name: &str) -> ColumnRef {
        ColumnRef::new("t", name)
    }

    fn tuple(pairs: &[(&str, Value)]) -> MapTuple {
        MapTuple(pairs.iter().map(|(k, v)| (col(k), v.clone())).collect())
    }

    #[test]
    fn test_compare_literal() {
        let row = tuple(&[("n", Value::Int64(5))]);
        assert!(Predicate::eq(col("n"), 5i64).eval(&row));
        assert!(Predicate::compare(col("n"), CompareOp::Gt, 4i64).eval(&row));
        assert!(!Predicate::compare(col("n"), CompareOp::Lt, 5i64).eval(&row));
        assert!(Predicate::eq(col("n"), 5.0f64).eval(&row));
    }

    #[test]
    fn test_null_comparisons_are_false() {
        let row = tuple(&[("n", Value::Null)]);
        assert!(!Predicate::eq(col("n"), Value::Null).eval(&row));
        assert!(!Predicate::compare(col("n"), CompareOp::Ne, 1i64).eval(&row));
        assert!(!Predicate::eq(col("missing"), 1i64).eval(&row));
        assert!(Predicate::IsNull {
            column: col("missing"),
            negated: false
        }
        .eval(&row));
    }

    #[test]
    fn test_column_operand() {
        let row = tuple(&[("a", Value::Int64(1)), ("b", Value::Int64(1))]);
        assert!(Predicate::columns_eq(col("a"), col("b")).eval(&row));
    }

    #[test]
    fn test_match() {
        let row = tuple(&[("s", Value::from("hello world"))]);
        let pattern = Pattern::new("wor").unwrap();
        let p = Predicate::Match {
            column: col("s"),
            pattern: pattern.clone(),
            negated: false,
        };
        assert!(p.eval(&row));
        let p = Predicate::Match {
            column: col("s"),
            pattern,
            negated: true,
        };
        assert!(!p.eval(&row));
        assert!(Pattern::new("(").is_err());
    }

    #[test]
    fn test_between_and_in() {
        let row = tuple(&[("n", Value::Int64(5))]);
        let between = Predicate::Between {
            column: col("n"),
            low: Value::Int64(1),
            high: Value::Int64(5),
        };
        assert!(between.eval(&row));
        assert!(Predicate::in_list(col("n"), vec![Value::Int64(3), Value::Int64(5)]).eval(&row));
        assert!(!Predicate::in_list(col("n"), vec![]).eval(&row));
    }

    #[test]
    fn test_logical() {
        let row = tuple(&[("a", Value::Int64(1)), ("b", Value::Int64(2))]);
        let p = Predicate::and(vec![
            Predicate::eq(col("a"), 1i64),
            Predicate::or(vec![
                Predicate::eq(col("b"), 3i64),
                Predicate::not(Predicate::eq(col("b"), 3i64)),
            ]),
        ]);
        assert!(p.eval(&row));
        assert_eq!(p.columns().len(), 3);
    }

    #[test]
    fn test_display() {
        let p = Predicate::and(vec![
            Predicate::eq(col("a"), 1i64),
            Predicate::not(Predicate::IsNull {
                column: col("b"),
                negated: false,
            }),
        ]);
        assert_eq!(p.to_string(), "(t.a = 1 AND NOT (t.b IS NULL))");
    }

    #[test]
    fn test_pattern_equality_by_source() {
        let a = Predicate::Match {
            column: col("s"),
            pattern: Pattern::new("x+").unwrap(),
            negated: false,
        };
        let b = Predicate::Match {
            column: col("s"),
            pattern: Pattern::new("x+").unwrap(),
            negated: false,
        };
        assert_eq!(a, b);
    }
}
