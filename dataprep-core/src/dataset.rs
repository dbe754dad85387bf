//! Dataset references: a loaded file bound to a name and a schema

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{Schema, SchemaHint};

/// On-disk format of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Delimited text with an optional header row
    Csv,
    /// Apache Parquet
    Parquet,
}

impl FileFormat {
    /// Detect the format of a file based on its extension
    pub fn detect_from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();

        match extension.as_str() {
            "csv" | "tsv" | "txt" => Some(FileFormat::Csv),
            "parquet" | "pq" => Some(FileFormat::Parquet),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Csv => write!(f, "csv"),
            FileFormat::Parquet => write!(f, "parquet"),
        }
    }
}

impl std::str::FromStr for FileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "parquet" => Ok(FileFormat::Parquet),
            other => Err(Error::InvalidArgument(format!("unsupported format: {other}"))),
        }
    }
}

/// How a CSV dataset is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CsvDialect {
    /// Field delimiter
    pub delimiter: u8,

    /// Whether the first record names the columns
    pub has_header: bool,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
        }
    }
}

/// A loaded file bound to a logical name and its column schema.
///
/// References are immutable once created and are shared as
/// [`Arc<DatasetReference>`].
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetReference {
    name: String,
    path: PathBuf,
    format: FileFormat,
    schema: Arc<Schema>,
    csv_dialect: CsvDialect,
    declared: SchemaHint,
}

impl DatasetReference {
    /// Create a new reference. `name` must be a plain identifier
    /// (letters, digits, underscores, not starting with a digit).
    pub fn new(
        name: &str,
        path: impl Into<PathBuf>,
        format: FileFormat,
        schema: Schema,
        csv_dialect: CsvDialect,
    ) -> Result<Arc<Self>> {
        Self::with_declared(name, path, format, schema, csv_dialect, SchemaHint::new())
    }

    /// Create a reference whose `declared` columns had their types set by
    /// the caller rather than inferred. Values of a declared column that do
    /// not convert to its type read as missing; anywhere else they are a
    /// format error.
    pub fn with_declared(
        name: &str,
        path: impl Into<PathBuf>,
        format: FileFormat,
        schema: Schema,
        csv_dialect: CsvDialect,
        declared: SchemaHint,
    ) -> Result<Arc<Self>> {
        if !is_identifier(name) {
            return Err(Error::InvalidArgument(format!(
                "dataset name '{name}' must be a plain identifier"
            )));
        }
        if schema.is_empty() {
            return Err(Error::Format(format!("dataset '{name}' has no columns")));
        }
        for (column, _) in declared.iter() {
            schema.index_of(column)?;
        }

        Ok(Arc::new(Self {
            name: name.to_string(),
            path: path.into(),
            format,
            schema: Arc::new(schema),
            csv_dialect,
            declared,
        }))
    }

    /// Logical name, also the view name inside the engine
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source format
    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Declared schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// CSV layout (ignored for Parquet)
    pub fn csv_dialect(&self) -> CsvDialect {
        self.csv_dialect
    }

    /// Whether the type of `column` was declared by the caller
    pub fn is_declared(&self, column: &str) -> bool {
        self.declared.get(column).is_some()
    }
}

/// Derive a dataset name from a file stem ("Data8277.csv" -> "data8277")
pub fn name_from_path(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidArgument(format!("cannot name dataset from {}", path.display())))?;

    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, 't');
        name.insert(1, '_');
    }
    Ok(name)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
