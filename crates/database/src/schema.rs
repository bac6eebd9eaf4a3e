//! Schema registry.
//!
//! Applications declare tables with [`SchemaDef`] before connecting. A
//! declaration names the columns, which one is the primary key, the
//! relationships to other tables and an optional dispose hook. `connect`
//! translates every pending declaration into an engine [`Table`].

use crate::clause::{Clause, ColumnHandle};
use crate::database::DisposeScope;
use hashbrown::HashMap;
use lumen_core::schema::{Column, Table, TableBuilder};
use lumen_core::{DataType, Error, Result};
use std::fmt;
use std::rc::Rc;

/// Prefix of the hidden column that keeps the raw value of a date-time or
/// literal-array column.
pub const SHADOW_PREFIX: &str = "__raw_";

/// Name of the shadow column for `column`.
pub fn shadow_name(column: &str) -> String {
    format!("{}{}", SHADOW_PREFIX, column)
}

/// Application-level column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bytes,
    Boolean,
    DateTime,
    Integer,
    Number,
    Object,
    String,
    /// An array of scalars, stored joined by `|` so it can be pattern
    /// matched.
    LiteralArray,
}

impl ColumnType {
    /// Storage type of the primary column.
    pub fn data_type(self) -> DataType {
        match self {
            ColumnType::Bytes => DataType::Bytes,
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::DateTime => DataType::DateTime,
            ColumnType::Integer => DataType::Int64,
            ColumnType::Number => DataType::Float64,
            ColumnType::Object => DataType::Json,
            ColumnType::String | ColumnType::LiteralArray => DataType::String,
        }
    }

    /// Whether the raw value is kept in a shadow column.
    pub fn has_shadow(self) -> bool {
        matches!(self, ColumnType::DateTime | ColumnType::LiteralArray)
    }
}

/// A column declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnDef {
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub unique: bool,
    pub index: bool,
    /// Non-key columns accept null unless marked otherwise.
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            primary_key: false,
            unique: false,
            index: false,
            nullable: true,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    /// Rejects null values for this column.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Cardinality of a relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Relationship {
    OneToOne,
    OneToMany,
    ManyToMany,
}

/// Builds the join condition of a relationship. The argument is the target
/// table bound to its alias; keys of the returned object clause are columns
/// of the owning table.
pub type JoinBuilder = Rc<dyn Fn(&TableHandle) -> Result<Clause>>;

/// Cascade hook run by `remove` with the rows about to be deleted.
pub type DisposeHandler = Rc<dyn Fn(&[serde_json::Value], &mut DisposeScope) -> Result<()>>;

/// A relationship declaration.
#[derive(Clone)]
pub struct RelationshipDef {
    pub target: String,
    pub kind: Relationship,
    pub join: JoinBuilder,
}

impl RelationshipDef {
    pub fn new<F>(target: impl Into<String>, kind: Relationship, join: F) -> Self
    where
        F: Fn(&TableHandle) -> Result<Clause> + 'static,
    {
        Self {
            target: target.into(),
            kind,
            join: Rc::new(join),
        }
    }

    pub fn one_to_one<F>(target: impl Into<String>, join: F) -> Self
    where
        F: Fn(&TableHandle) -> Result<Clause> + 'static,
    {
        Self::new(target, Relationship::OneToOne, join)
    }

    pub fn one_to_many<F>(target: impl Into<String>, join: F) -> Self
    where
        F: Fn(&TableHandle) -> Result<Clause> + 'static,
    {
        Self::new(target, Relationship::OneToMany, join)
    }
}

impl fmt::Debug for RelationshipDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationshipDef")
            .field("target", &self.target)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Declaration of one table.
#[derive(Clone, Default)]
pub struct SchemaDef {
    columns: Vec<(String, ColumnDef)>,
    relationships: Vec<(String, RelationshipDef)>,
    dispose: Option<DisposeHandler>,
}

impl SchemaDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    pub fn column(mut self, name: impl Into<String>, def: ColumnDef) -> Self {
        self.columns.push((name.into(), def));
        self
    }

    /// Adds a relationship.
    pub fn relationship(mut self, name: impl Into<String>, def: RelationshipDef) -> Self {
        self.relationships.push((name.into(), def));
        self
    }

    /// Sets the dispose hook.
    pub fn dispose<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[serde_json::Value], &mut DisposeScope) -> Result<()> + 'static,
    {
        self.dispose = Some(Rc::new(handler));
        self
    }
}

/// A registered table declaration.
pub struct TableSchema {
    name: String,
    primary_key: String,
    columns: Vec<(String, ColumnDef)>,
    relationships: Vec<(String, RelationshipDef)>,
    dispose: Option<DisposeHandler>,
}

impl TableSchema {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the primary key column.
    #[inline]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Declaration of the primary key column.
    pub fn primary_def(&self) -> ColumnDef {
        self.column(&self.primary_key)
            .unwrap_or_else(|| ColumnDef::new(ColumnType::String).primary_key())
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnDef)> {
        self.columns.iter().map(|(name, def)| (name.as_str(), *def))
    }

    pub fn column(&self, name: &str) -> Option<ColumnDef> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, def)| *def)
    }

    /// Relationships in declaration order.
    pub fn relationships(&self) -> impl Iterator<Item = (&str, &RelationshipDef)> {
        self.relationships.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, def)| def)
    }

    pub fn dispose_handler(&self) -> Option<&DisposeHandler> {
        self.dispose.as_ref()
    }

    /// Translates the declaration into an engine table.
    fn to_table(&self) -> Result<Table> {
        let mut builder = TableBuilder::new(self.name.as_str())?;
        let mut nullable = Vec::new();
        for (name, def) in &self.columns {
            let column = Column::new(name.as_str(), def.column_type.data_type())
                .unique(def.unique)
                .indexed(def.index);
            builder = builder.add(column)?;
            if def.nullable && !def.primary_key {
                nullable.push(name.clone());
            }
            if def.column_type.has_shadow() {
                let shadow = shadow_name(name);
                builder = builder.add_column(shadow.as_str(), DataType::Json)?;
                nullable.push(shadow);
            }
        }
        let nullable: Vec<&str> = nullable.iter().map(String::as_str).collect();
        builder
            .add_nullable(&nullable)
            .add_primary_key(&self.primary_key)?
            .build()
    }
}

impl fmt::Debug for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSchema")
            .field("name", &self.name)
            .field("primary_key", &self.primary_key)
            .field("columns", &self.columns)
            .field("relationships", &self.relationships)
            .finish_non_exhaustive()
    }
}

/// Access to a table's columns from inside a join builder.
pub struct TableHandle {
    alias: String,
    schema: Rc<TableSchema>,
}

impl TableHandle {
    pub(crate) fn new(alias: impl Into<String>, schema: Rc<TableSchema>) -> Self {
        Self {
            alias: alias.into(),
            schema,
        }
    }

    /// Physical table name.
    pub fn table(&self) -> &str {
        self.schema.name()
    }

    /// Alias the table is bound to in the query.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// A column of this table, usable as a clause operand.
    pub fn column(&self, name: &str) -> Result<Clause> {
        let def = self
            .schema
            .column(name)
            .ok_or_else(|| Error::column_not_found(self.schema.name(), name))?;
        Ok(Clause::Column(ColumnHandle {
            alias: self.alias.clone(),
            column: name.to_string(),
            column_type: def.column_type,
        }))
    }
}

/// Every table declaration known to a database.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, Rc<TableSchema>>,
    pending: Vec<String>,
    connected: bool,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table declaration.
    pub fn define(&mut self, name: &str, def: SchemaDef) -> Result<()> {
        if self.connected {
            return Err(Error::invalid_schema(format!(
                "cannot define {} after connect",
                name
            )));
        }
        if self.tables.contains_key(name) {
            return Err(Error::invalid_schema(format!("table {} is already defined", name)));
        }
        let mut keys = def.columns.iter().filter(|(_, c)| c.primary_key);
        let primary_key = match (keys.next(), keys.next()) {
            (Some((key, _)), None) => key.clone(),
            (None, _) => {
                return Err(Error::invalid_schema(format!(
                    "table {} has no primary key",
                    name
                )))
            }
            (Some(_), Some(_)) => {
                return Err(Error::invalid_schema(format!(
                    "table {} declares more than one primary key",
                    name
                )))
            }
        };
        for (key, relationship) in &def.relationships {
            if relationship.kind == Relationship::ManyToMany {
                return Err(Error::unimplemented(format!(
                    "many-to-many relationship {}.{}",
                    name, key
                )));
            }
            if def.columns.iter().any(|(column, _)| column == key) {
                return Err(Error::invalid_schema(format!(
                    "{}.{} is declared as both a column and a relationship",
                    name, key
                )));
            }
        }

        self.tables.insert(
            name.to_string(),
            Rc::new(TableSchema {
                name: name.to_string(),
                primary_key,
                columns: def.columns,
                relationships: def.relationships,
                dispose: def.dispose,
            }),
        );
        self.pending.push(name.to_string());
        Ok(())
    }

    /// Translates every pending declaration into an engine table.
    pub fn materialize(&self) -> Result<Vec<Table>> {
        if self.connected {
            return Err(Error::invalid_operation("database is already connected"));
        }
        self.pending
            .iter()
            .map(|name| self.table(name)?.to_table())
            .collect()
    }

    /// Locks the registry once the engine has been opened.
    pub fn seal(&mut self) {
        self.pending.clear();
        self.connected = true;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Looks up a declaration.
    pub fn table(&self, name: &str) -> Result<Rc<TableSchema>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::table_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Number of declared tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
