//! Select and mutation statements.

use crate::ast::expr::{ColumnRef, SortOrder, TableRef};
use crate::ast::predicate::Predicate;
use core::fmt;
use lumen_core::Value;

/// A left outer join of one aliased table.
///
/// A join without a condition pairs every left row with every right row.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub table: TableRef,
    pub on: Option<Predicate>,
}

/// One ordering term.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub order: SortOrder,
}

/// A select statement.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectStatement {
    pub from: TableRef,
    pub columns: Vec<ColumnRef>,
    pub joins: Vec<Join>,
    pub filter: Option<Predicate>,
    pub order_by: Vec<OrderBy>,
    pub distinct: bool,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

impl SelectStatement {
    /// Creates an empty select over one table.
    pub fn new(from: TableRef) -> Self {
        Self {
            from,
            columns: Vec::new(),
            joins: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            distinct: false,
            limit: None,
            skip: None,
        }
    }

    /// Adds a projected column.
    pub fn column(mut self, column: ColumnRef) -> Self {
        self.columns.push(column);
        self
    }

    /// Replaces the projection.
    pub fn columns(mut self, columns: Vec<ColumnRef>) -> Self {
        self.columns = columns;
        self
    }

    /// Adds a left outer join.
    pub fn join(mut self, table: TableRef, on: Option<Predicate>) -> Self {
        self.joins.push(Join { table, on });
        self
    }

    /// Adds a filter, conjoining with any existing one.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => Predicate::and(vec![existing, predicate]),
            None => predicate,
        });
        self
    }

    /// Adds an ordering term.
    pub fn order_by(mut self, column: ColumnRef, order: SortOrder) -> Self {
        self.order_by.push(OrderBy { column, order });
        self
    }

    /// Marks the projection distinct.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Sets the limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of leading rows to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Whether this statement selects a window of its result.
    pub fn is_paginated(&self) -> bool {
        self.limit.is_some() || self.skip.is_some()
    }

    /// Physical tables read by this statement.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables = vec![self.from.table.as_str()];
        for join in &self.joins {
            if !tables.contains(&join.table.table.as_str()) {
                tables.push(join.table.table.as_str());
            }
        }
        tables
    }

    /// Text of the projection, source and joins only.
    ///
    /// Two statements with the same fingerprint read the same relation shape.
    pub fn fingerprint(&self) -> String {
        let mut out = String::new();
        self.write_head(&mut out);
        out
    }

    fn write_head(&self, out: &mut String) {
        use core::fmt::Write;
        let _ = write!(out, "SELECT ");
        if self.distinct {
            let _ = write!(out, "DISTINCT ");
        }
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                let _ = write!(out, ", ");
            }
            let _ = write!(out, "{}", c);
        }
        let _ = write!(out, " FROM {}", self.from);
        for join in &self.joins {
            let _ = write!(out, " LEFT JOIN {}", join.table);
            if let Some(on) = &join.on {
                let _ = write!(out, " ON {}", on);
            }
        }
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())?;
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {}", filter)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            for (i, term) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} {}", term.column, term.order)?;
            }
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(skip) = self.skip {
            write!(f, " OFFSET {}", skip)?;
        }
        Ok(())
    }
}

/// Inserts rows given as column/value pairs. Omitted columns take their
/// default. With `replace`, an existing row with the same primary key is
/// overwritten instead of failing.
#[derive(Clone, Debug, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub rows: Vec<Vec<(String, Value)>>,
    pub replace: bool,
}

/// Sets columns on every row matching the filter. Column references in the
/// filter use the table name as alias.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub set: Vec<(String, Value)>,
    pub filter: Option<Predicate>,
}

/// Deletes every row matching the filter.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub filter: Option<Predicate>,
}

/// A mutation statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl Statement {
    /// The table this statement writes.
    pub fn table(&self) -> &str {
        match self {
            Statement::Insert(s) => &s.table,
            Statement::Update(s) => &s.table,
            Statement::Delete(s) => &s.table,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Insert(s) => {
                let verb = if s.replace { "INSERT OR REPLACE" } else { "INSERT" };
                write!(f, "{} INTO {} ({} rows)", verb, s.table, s.rows.len())
            }
            Statement::Update(s) => {
                write!(f, "UPDATE {} SET ", s.table)?;
                for (i, (column, value)) in s.set.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", column, value)?;
                }
                if let Some(filter) = &s.filter {
                    write!(f, " WHERE {}", filter)?;
                }
                Ok(())
            }
            Statement::Delete(s) => {
                write!(f, "DELETE FROM {}", s.table)?;
                if let Some(filter) = &s.filter {
                    write!(f, " WHERE {}", filter)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Predicate;

    fn sample() -> SelectStatement {
        SelectStatement::new(TableRef::new("post", "post@0"))
            .column(ColumnRef::new("post@0", "_id"))
            .column(ColumnRef::new("user@1", "name"))
            .join(
                TableRef::new("user", "user@1"),
                Some(Predicate::columns_eq(
                    ColumnRef::new("post@0", "author"),
                    ColumnRef::new("user@1", "_id"),
                )),
            )
    }

    #[test]
    fn test_display() {
        let stmt = sample()
            .filter(Predicate::eq(ColumnRef::new("post@0", "title"), "x"))
            .order_by(ColumnRef::new("post@0", "_id"), SortOrder::Desc)
            .limit(10)
            .skip(20);
        assert_eq!(
            stmt.to_string(),
            "SELECT post@0._id, user@1.name FROM post AS post@0 \
             LEFT JOIN user AS user@1 ON post@0.author = user@1._id \
             WHERE post@0.title = \"x\" ORDER BY post@0._id DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_fingerprint_ignores_filter_and_window() {
        let a = sample().limit(5);
        let b = sample()
            .filter(Predicate::eq(ColumnRef::new("post@0", "title"), "x"))
            .skip(5);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.is_paginated());
        assert!(!sample().is_paginated());
    }

    #[test]
    fn test_filter_conjoins() {
        let stmt = sample()
            .filter(Predicate::eq(ColumnRef::new("post@0", "a"), 1i64))
            .filter(Predicate::eq(ColumnRef::new("post@0", "b"), 2i64));
        assert!(matches!(stmt.filter, Some(Predicate::And(ref v)) if v.len() == 2));
    }

    #[test]
    fn test_tables() {
        assert_eq!(sample().tables(), vec!["post", "user"]);
    }
}
