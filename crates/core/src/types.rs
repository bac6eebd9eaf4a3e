//! Storage data types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of an engine column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    Float64,
    String,
    /// Milliseconds since the Unix epoch.
    DateTime,
    Bytes,
    /// An arbitrary JSON document, used for shadow columns.
    Json,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// Whether a column of this type stores values of type `value`.
    /// Integers and floats are interchangeable.
    pub fn accepts(self, value: DataType) -> bool {
        self == value || (self.is_numeric() && value.is_numeric())
    }

    /// Documents and blobs are null unless set.
    pub fn is_nullable_by_default(self) -> bool {
        matches!(self, DataType::Bytes | DataType::Json)
    }

    /// Whether the type can back a primary key or unique column.
    pub fn is_indexable(self) -> bool {
        !matches!(self, DataType::Bytes | DataType::Json)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "boolean",
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::String => "string",
            DataType::DateTime => "datetime",
            DataType::Bytes => "bytes",
            DataType::Json => "json",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_types_accept_each_other() {
        assert!(DataType::Int64.accepts(DataType::Float64));
        assert!(DataType::Float64.accepts(DataType::Int64));
        assert!(DataType::DateTime.accepts(DataType::DateTime));
        assert!(!DataType::DateTime.accepts(DataType::Int64));
        assert!(!DataType::String.accepts(DataType::Json));
    }

    #[test]
    fn test_shadow_types_are_not_keys() {
        assert!(DataType::Json.is_nullable_by_default());
        assert!(!DataType::Json.is_indexable());
        assert!(!DataType::String.is_nullable_by_default());
        assert!(DataType::String.is_indexable());
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::DateTime.to_string(), "datetime");
        assert_eq!(DataType::Json.to_string(), "json");
    }
}
