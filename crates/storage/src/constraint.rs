//! Constraint checking for Lumen storage.
//!
//! This module validates rows against their table before they are stored:
//! not-null constraints and column types.

use lumen_core::schema::Table;
use lumen_core::{DataType, Error, Result, Row, Value};

/// Constraint checker for validating rows.
pub struct ConstraintChecker;

impl ConstraintChecker {
    /// Checks the not-null constraint for a row.
    pub fn check_not_null(schema: &Table, row: &Row) -> Result<()> {
        for column in schema.columns() {
            if column.is_nullable() {
                continue;
            }
            if row.get(column.index()).map_or(true, Value::is_null) {
                return Err(Error::null_constraint(format!(
                    "{}.{}",
                    schema.name(),
                    column.name()
                )));
            }
        }
        Ok(())
    }

    /// Checks that every non-null value matches its column type. Integers
    /// and floats are interchangeable.
    pub fn check_types(schema: &Table, row: &Row) -> Result<()> {
        if row.len() != schema.columns().len() {
            return Err(Error::invalid_operation(format!(
                "row has {} values, table {} has {} columns",
                row.len(),
                schema.name(),
                schema.columns().len()
            )));
        }
        for (column, value) in schema.columns().iter().zip(row.values()) {
            match value.data_type() {
                Some(got) if !column.accepts(value) => {
                    return Err(Error::type_mismatch(column.data_type(), got))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Runs every check.
    pub fn check_row(schema: &Table, row: &Row) -> Result<()> {
        Self::check_types(schema, row)?;
        Self::check_not_null(schema, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::schema::TableBuilder;

    fn schema() -> Table {
        TableBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("score", DataType::Float64)
            .unwrap()
            .add_column("note", DataType::String)
            .unwrap()
            .add_primary_key("id")
            .unwrap()
            .add_nullable(&["note"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_not_null() {
        let ok = Row::new(1, vec![Value::Int64(1), Value::Float64(1.0), Value::Null]);
        assert!(ConstraintChecker::check_row(&schema(), &ok).is_ok());
        let bad = Row::new(1, vec![Value::Null, Value::Float64(1.0), Value::Null]);
        assert!(matches!(
            ConstraintChecker::check_row(&schema(), &bad),
            Err(Error::NullConstraint { .. })
        ));
    }

    #[test]
    fn test_types() {
        let numeric = Row::new(1, vec![Value::Int64(1), Value::Int64(3), Value::Null]);
        assert!(ConstraintChecker::check_types(&schema(), &numeric).is_ok());
        let bad = Row::new(1, vec![Value::Int64(1), Value::Float64(1.0), Value::Boolean(true)]);
        assert!(matches!(
            ConstraintChecker::check_types(&schema(), &bad),
            Err(Error::TypeMismatch { .. })
        ));
        let short = Row::new(1, vec![Value::Int64(1)]);
        assert!(ConstraintChecker::check_types(&schema(), &short).is_err());
    }
}
