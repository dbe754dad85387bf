//! Materialized query results

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// Longest cell rendered by the [`fmt::Display`] implementation
const MAX_CELL_WIDTH: usize = 32;

/// A finite, in-memory set of rows produced by executing a query.
///
/// The table is owned by whoever requested the materialization; nothing is
/// cached or shared between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// Create a table, checking that every row is as wide as the header
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != columns.len()) {
            return Err(Error::InvalidArgument(format!(
                "row {} has {} values but the table has {} columns",
                index,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns.iter().position(|c| c == name).ok_or_else(|| {
            let available: Vec<&str> = self.columns.iter().map(String::as_str).collect();
            Error::unknown_column(name, &available)
        })
    }

    /// All values of one column
    pub fn column(&self, name: &str) -> Result<Vec<&Value>> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| &row[index]).collect())
    }

    /// One cell
    pub fn value(&self, row: usize, column: &str) -> Result<&Value> {
        let index = self.column_index(column)?;
        self.rows
            .get(row)
            .map(|r| &r[index])
            .ok_or_else(|| Error::InvalidArgument(format!("row {row} out of range ({} rows)", self.rows.len())))
    }

    /// Keep at most the first `n` rows
    #[must_use]
    pub fn head(mut self, n: usize) -> Self {
        self.rows.truncate(n);
        self
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|v| truncate(&v.to_string())).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let separator: String = widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+");
        let separator = format!("+{separator}+");

        writeln!(f, "{separator}")?;
        write_row(f, self.columns.iter().map(String::as_str), &widths)?;
        writeln!(f, "{separator}")?;
        for row in &cells {
            write_row(f, row.iter().map(String::as_str), &widths)?;
        }
        writeln!(f, "{separator}")?;
        write!(f, "{} rows x {} columns", self.rows.len(), self.columns.len())
    }
}

fn write_row<'a>(
    f: &mut fmt::Formatter<'_>,
    cells: impl Iterator<Item = &'a str>,
    widths: &[usize],
) -> fmt::Result {
    write!(f, "|")?;
    for (cell, width) in cells.zip(widths) {
        write!(f, " {cell:<width$} |")?;
    }
    writeln!(f)
}

fn truncate(cell: &str) -> String {
    if cell.chars().count() <= MAX_CELL_WIDTH {
        cell.to_string()
    } else {
        let mut short: String = cell.chars().take(MAX_CELL_WIDTH - 3).collect();
        short.push_str("...");
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultTable {
        ResultTable::new(
            vec!["id".into(), "x".into()],
            vec![
                vec![Value::Integer(1), Value::from("a")],
                vec![Value::Integer(2), Value::Missing],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = ResultTable::new(vec!["id".into()], vec![vec![Value::Integer(1), Value::Integer(2)]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_column_access() {
        let table = sample();
        assert_eq!(table.column("x").unwrap(), vec![&Value::from("a"), &Value::Missing]);
        assert_eq!(table.value(0, "id").unwrap(), &Value::Integer(1));
        assert!(table.value(5, "id").is_err());
        assert!(table.column("y").is_err());
    }

    #[test]
    fn test_display_renders_missing_marker() {
        let rendered = sample().to_string();
        assert!(rendered.contains("| id | x  |"));
        assert!(rendered.contains("| 2  | NA |"));
        assert!(rendered.ends_with("2 rows x 2 columns"));
    }

    #[test]
    fn test_head_truncates() {
        assert_eq!(sample().head(1).num_rows(), 1);
        assert_eq!(sample().head(10).num_rows(), 2);
    }
}
