//! Schema inference for delimited text files

use std::collections::HashSet;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

use dataprep_core::value::MISSING_MARKER;
use dataprep_core::{ColumnType, CsvDialect, Field, Schema};

use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Options for reading CSV files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Field delimiter
    pub delimiter: u8,

    /// Whether the first record names the columns
    pub has_header: bool,

    /// Number of records sampled for type inference
    pub schema_inference_rows: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            schema_inference_rows: 1000,
        }
    }
}

impl CsvOptions {
    /// The layout part of these options
    pub fn dialect(&self) -> CsvDialect {
        CsvDialect {
            delimiter: self.delimiter,
            has_header: self.has_header,
        }
    }
}

/// Infer a schema from the header and the first records of `path`.
///
/// Only `schema_inference_rows` records are read.
pub fn infer_schema(path: &Path, options: &CsvOptions) -> Result<Schema> {
    let csv_error = |source| Error::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(options.has_header)
        .from_path(path)
        .map_err(csv_error)?;

    let header = reader.headers().map_err(csv_error)?.clone();
    if header.is_empty() {
        return Err(Error::Format(format!("{} is empty", path.display())));
    }

    let names: Vec<String> = if options.has_header {
        header
            .iter()
            .map(|name| name.trim_start_matches('\u{feff}').trim().to_string())
            .collect()
    } else {
        (0..header.len()).map(|i| format!("column_{i}")).collect()
    };
    check_names(path, &names)?;

    let mut sample = Vec::new();
    for record in reader.records().take(options.schema_inference_rows) {
        sample.push(record.map_err(csv_error)?);
    }

    let fields = names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let values: Vec<&str> = sample.iter().filter_map(|record| record.get(index)).collect();
            Field::new(name, infer_column_type(&values))
        })
        .collect();

    Ok(Schema::new(fields)?)
}

fn check_names(path: &Path, names: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        if name.is_empty() {
            return Err(Error::Format(format!("{}: column {index} has no name", path.display())));
        }
        if !seen.insert(name.as_str()) {
            return Err(Error::Format(format!("{}: column '{name}' appears twice", path.display())));
        }
    }
    Ok(())
}

/// Narrowest type that accepts every non-missing value.
///
/// Candidates are tried in order: integer, float, boolean, date, timestamp,
/// then string. Integers written with leading zeros are codes, not
/// quantities, and come out as categorical.
pub fn infer_column_type(values: &[&str]) -> ColumnType {
    let present: Vec<&str> = values
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != MISSING_MARKER)
        .collect();

    if present.is_empty() {
        return ColumnType::String;
    }

    if present.iter().all(|s| s.parse::<i64>().is_ok()) {
        if present.iter().any(|s| has_leading_zero(s)) {
            return ColumnType::Categorical;
        }
        return ColumnType::Integer;
    }

    if present.iter().all(|s| s.parse::<f64>().is_ok()) {
        return ColumnType::Float;
    }

    if present
        .iter()
        .all(|s| s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false"))
    {
        return ColumnType::Boolean;
    }

    if present.iter().all(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).is_ok()) {
        return ColumnType::Date;
    }

    if present.iter().all(|s| {
        TIMESTAMP_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(s, format).is_ok())
    }) {
        return ColumnType::Timestamp;
    }

    ColumnType::String
}

fn has_leading_zero(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    digits.len() > 1 && digits.starts_with('0')
}
