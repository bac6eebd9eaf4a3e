//! Error types for Lumen.

use crate::types::DataType;
use crate::value::Value;
use core::fmt;

/// Result type alias for Lumen operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for Lumen operations.
///
/// Errors are `Clone` so that a failed deferred resolution can be replayed to
/// every consumer that shares it.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Type mismatch error.
    TypeMismatch {
        expected: DataType,
        got: DataType,
    },
    /// Null constraint violation.
    NullConstraint {
        column: String,
    },
    /// Unique constraint violation.
    UniqueConstraint {
        table: String,
        column: String,
        value: Value,
    },
    /// Invalid schema definition.
    InvalidSchema {
        message: String,
    },
    /// Column not found.
    ColumnNotFound {
        table: String,
        column: String,
    },
    /// Table not found.
    TableNotFound {
        name: String,
    },
    /// A query that cannot be compiled or hydrated.
    InvalidQuery {
        message: String,
    },
    /// The same key was assigned twice at one level of a join plan.
    AliasConflict {
        table: String,
        key: String,
    },
    /// An entity node in a mutation graph has no primary key value.
    MissingPrimaryKey {
        table: String,
        column: String,
    },
    /// A declared feature that is intentionally not implemented.
    Unimplemented {
        feature: String,
    },
    /// A single-consumption handle was accessed twice in the same mode.
    Consumed {
        mode: &'static str,
    },
    /// Selectors that cannot be concatenated.
    IncompatibleSelectors {
        message: String,
    },
    /// The database has not been connected yet.
    NotConnected,
    /// Dump or load failure.
    Serialization {
        message: String,
    },
    /// Invalid operation.
    InvalidOperation {
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TypeMismatch { expected, got } => {
                write!(f, "Type mismatch: expected {:?}, got {:?}", expected, got)
            }
            Error::NullConstraint { column } => {
                write!(f, "Null constraint violation on column: {}", column)
            }
            Error::UniqueConstraint {
                table,
                column,
                value,
            } => {
                write!(
                    f,
                    "Unique constraint violation on {}.{}: {}",
                    table, column, value
                )
            }
            Error::InvalidSchema { message } => {
                write!(f, "Invalid schema: {}", message)
            }
            Error::ColumnNotFound { table, column } => {
                write!(f, "Column {} not found in table {}", column, table)
            }
            Error::TableNotFound { name } => {
                write!(f, "Table not found: {}", name)
            }
            Error::InvalidQuery { message } => {
                write!(f, "Invalid query: {}", message)
            }
            Error::AliasConflict { table, key } => {
                write!(f, "Alias conflict: {} is assigned twice in {}", key, table)
            }
            Error::MissingPrimaryKey { table, column } => {
                write!(
                    f,
                    "Entity of table {} has no primary key value ({})",
                    table, column
                )
            }
            Error::Unimplemented { feature } => {
                write!(f, "Not implemented: {}", feature)
            }
            Error::Consumed { mode } => {
                write!(f, "Query has already been consumed through {}()", mode)
            }
            Error::IncompatibleSelectors { message } => {
                write!(f, "Incompatible selectors: {}", message)
            }
            Error::NotConnected => write!(f, "Database is not connected"),
            Error::Serialization { message } => {
                write!(f, "Serialization failure: {}", message)
            }
            Error::InvalidOperation { message } => {
                write!(f, "Invalid operation: {}", message)
            }
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: DataType, got: DataType) -> Self {
        Error::TypeMismatch { expected, got }
    }

    /// Creates a null constraint error.
    pub fn null_constraint(column: impl Into<String>) -> Self {
        Error::NullConstraint {
            column: column.into(),
        }
    }

    /// Creates a unique constraint error.
    pub fn unique_constraint(
        table: impl Into<String>,
        column: impl Into<String>,
        value: Value,
    ) -> Self {
        Error::UniqueConstraint {
            table: table.into(),
            column: column.into(),
            value,
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Error::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates an alias conflict error.
    pub fn alias_conflict(table: impl Into<String>, key: impl Into<String>) -> Self {
        Error::AliasConflict {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Creates a missing primary key error.
    pub fn missing_primary_key(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::MissingPrimaryKey {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates an unimplemented feature error.
    pub fn unimplemented(feature: impl Into<String>) -> Self {
        Error::Unimplemented {
            feature: feature.into(),
        }
    }

    /// Creates an incompatible selectors error.
    pub fn incompatible(message: impl Into<String>) -> Self {
        Error::IncompatibleSelectors {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl fmt::Display) -> Self {
        Error::Serialization {
            message: message.to_string(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }
}
