//! Column types and schemas for loaded datasets

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit signed integer
    Integer,

    /// 64-bit floating point
    Float,

    /// Boolean
    Boolean,

    /// UTF-8 text
    String,

    /// Categorical code, stored as text ("01", "9999")
    Categorical,

    /// Calendar date
    Date,

    /// Timestamp without time zone
    Timestamp,
}

impl ColumnType {
    /// Check if this type is numeric
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// Check if this type holds text
    pub fn is_textual(self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Categorical)
    }

    /// SQL type name used when declaring or casting a column
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::String | ColumnType::Categorical => "VARCHAR",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Result type of combining two operands arithmetically
    pub fn arithmetic_result(self, other: ColumnType) -> Option<ColumnType> {
        match (self, other) {
            (ColumnType::Integer, ColumnType::Integer) => Some(ColumnType::Integer),
            (a, b) if a.is_numeric() && b.is_numeric() => Some(ColumnType::Float),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::String => write!(f, "string"),
            ColumnType::Categorical => write!(f, "categorical"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Name of the field
    pub name: String,

    /// Type of the field
    pub column_type: ColumnType,
}

impl Field {
    /// Create a new field
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
        }
    }

    /// Get the name of this field
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the type of this field
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.column_type)
    }
}

/// Ordered set of uniquely named fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Field>", into = "Vec<Field>")]
pub struct Schema {
    fields: Vec<Field>,

    /// Field indices by name for faster lookup
    field_indices: HashMap<String, usize>,
}

impl Schema {
    /// Create a new schema, rejecting duplicate names
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut field_indices = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if field_indices.insert(field.name.clone(), i).is_some() {
                return Err(Error::Schema(format!("duplicate column '{}'", field.name)));
            }
        }

        Ok(Self {
            fields,
            field_indices,
        })
    }

    /// Get all fields in this schema
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Column names in order
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::name).collect()
    }

    /// Get a field by name
    pub fn field_by_name(&self, name: &str) -> Result<&Field> {
        let index = self.index_of(name)?;
        Ok(&self.fields[index])
    }

    /// Get the index of a field by name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.field_indices
            .get(name)
            .copied()
            .ok_or_else(|| Error::unknown_column(name, &self.names()))
    }

    /// Check whether a column exists
    pub fn contains(&self, name: &str) -> bool {
        self.field_indices.contains_key(name)
    }

    /// Get the number of fields in this schema
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if this schema is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Create a projection of this schema with only the specified field names
    pub fn project_by_names(&self, names: &[&str]) -> Result<Self> {
        let fields = names
            .iter()
            .map(|&name| self.field_by_name(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }

    /// Apply declared types over inferred ones
    pub fn with_hint(&self, hint: &SchemaHint) -> Result<Self> {
        let mut fields = self.fields.clone();
        for (name, column_type) in hint.iter() {
            let index = self.index_of(name)?;
            fields[index].column_type = column_type;
        }
        Self::new(fields)
    }
}

impl TryFrom<Vec<Field>> for Schema {
    type Error = Error;

    fn try_from(fields: Vec<Field>) -> Result<Self> {
        Self::new(fields)
    }
}

impl From<Schema> for Vec<Field> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema: {} fields", self.fields.len())?;
        for field in &self.fields {
            writeln!(f, "  {field}")?;
        }
        Ok(())
    }
}

/// Declared column types that override inference at load time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaHint {
    columns: BTreeMap<String, ColumnType>,
}

impl SchemaHint {
    /// Create an empty hint
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the type of one column
    #[must_use]
    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.insert(name.to_string(), column_type);
        self
    }

    /// Declared type of `name`, if any
    pub fn get(&self, name: &str) -> Option<ColumnType> {
        self.columns.get(name).copied()
    }

    /// Iterate declared columns in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> + '_ {
        self.columns.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    /// Check if no column is declared
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
