//! AST module for statements and predicates.

mod expr;
mod predicate;
mod statement;

pub use expr::{ColumnRef, CompareOp, Operand, SortOrder, TableRef};
pub use predicate::{Pattern, Predicate, Tuple};
pub use statement::{
    DeleteStatement, InsertStatement, Join, OrderBy, SelectStatement, Statement, UpdateStatement,
};
