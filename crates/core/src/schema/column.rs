//! Engine column definitions.

use crate::types::DataType;
use crate::value::Value;

/// One physical column of an engine table.
#[derive(Clone, Debug)]
pub struct Column {
    name: String,
    data_type: DataType,
    nullable: bool,
    unique: bool,
    indexed: bool,
    /// Position in the owning table, assigned by the builder.
    index: usize,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: data_type.is_nullable_by_default(),
            unique: false,
            indexed: false,
            index: 0,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Marks the column as declared indexed. The flag is kept for the
    /// mapping layer; lookups other than by primary key scan.
    pub fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[inline]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Value stored when an insert omits the column: null if the column
    /// allows it, the zero value of its type otherwise.
    pub fn default_value(&self) -> Value {
        if self.nullable {
            Value::Null
        } else {
            Value::default_for_type(self.data_type)
        }
    }

    /// Whether `value` can be stored in this column.
    pub fn accepts(&self, value: &Value) -> bool {
        match value.data_type() {
            None => self.nullable,
            Some(data_type) => self.data_type.accepts(data_type),
        }
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.data_type == other.data_type
    }
}
