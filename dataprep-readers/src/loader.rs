//! Turning local files into dataset references

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use dataprep_core::dataset::name_from_path;
use dataprep_core::{DatasetReference, FileFormat, SchemaHint};

use crate::csv::{infer_schema, CsvOptions};
use crate::error::{Error, Result};
use crate::parquet::read_schema;

/// Binds local CSV and Parquet files to names and schemas.
///
/// Loading inspects only a file's header and a bounded sample (CSV) or its
/// footer (Parquet); rows are left to the query engine.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    csv: CsvOptions,
}

impl Loader {
    /// Create a loader with the given CSV options
    pub fn new(csv: CsvOptions) -> Self {
        Self { csv }
    }

    /// CSV options in use
    pub fn csv_options(&self) -> &CsvOptions {
        &self.csv
    }

    /// Load `path` as `format`, naming the dataset after the file stem
    pub fn load(&self, path: &Path, format: FileFormat) -> Result<Arc<DatasetReference>> {
        let name = name_from_path(path)?;
        self.load_with(&name, path, format, &SchemaHint::new())
    }

    /// Load `path`, taking the format from its extension
    pub fn load_detected(&self, path: &Path) -> Result<Arc<DatasetReference>> {
        let format = FileFormat::detect_from_path(path)
            .ok_or_else(|| Error::Format(format!("cannot tell the format of {} from its name", path.display())))?;
        self.load(path, format)
    }

    /// Load `path` under `name`, with `hint` overriding inferred column types
    pub fn load_with(
        &self,
        name: &str,
        path: &Path,
        format: FileFormat,
        hint: &SchemaHint,
    ) -> Result<Arc<DatasetReference>> {
        let started = Instant::now();
        let path = path
            .canonicalize()
            .map_err(|e| Error::Format(format!("cannot open {}: {e}", path.display())))?;
        if !path.is_file() {
            return Err(Error::Format(format!("{} is not a file", path.display())));
        }

        let inferred = match format {
            FileFormat::Csv => infer_schema(&path, &self.csv)?,
            FileFormat::Parquet => read_schema(&path)?,
        };
        let schema = if hint.is_empty() {
            inferred
        } else {
            inferred.with_hint(hint)?
        };

        let dataset =
            DatasetReference::with_declared(name, &path, format, schema, self.csv.dialect(), hint.clone())?;
        info!(
            dataset = name,
            path = %path.display(),
            format = %format,
            columns = dataset.schema().len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "dataset loaded"
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataprep_core::{ColumnType, ErrorKind};
    use std::fs;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    #[test]
    fn test_load_csv_names_dataset_after_file() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Data8277.csv");
        fs::write(&path, "Year,Age,count\n2018,1,10\n").unwrap();

        let dataset = Loader::default().load(&path, FileFormat::Csv).unwrap();
        assert_eq!(dataset.name(), "data8277");
        assert_eq!(dataset.format(), FileFormat::Csv);
        assert!(dataset.path().is_absolute());
        assert_eq!(dataset.schema().names(), vec!["Year", "Age", "count"]);
    }

    #[test]
    fn test_hint_overrides_inference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "code,count\n1,..C\n").unwrap();

        let hint = SchemaHint::new()
            .column("code", ColumnType::Categorical)
            .column("count", ColumnType::Integer);
        let dataset = Loader::default()
            .load_with("census", &path, FileFormat::Csv, &hint)
            .unwrap();

        assert_eq!(dataset.schema().field_by_name("code").unwrap().column_type(), ColumnType::Categorical);
        assert_eq!(dataset.schema().field_by_name("count").unwrap().column_type(), ColumnType::Integer);
        assert!(dataset.is_declared("count"));
    }

    #[test]
    fn test_inferred_columns_are_not_declared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b\n1,x\n").unwrap();

        let dataset = Loader::default().load(&path, FileFormat::Csv).unwrap();
        assert!(!dataset.is_declared("a"));
        assert!(!dataset.is_declared("b"));
    }

    #[test]
    fn test_hint_for_unknown_column_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a\n1\n").unwrap();

        let hint = SchemaHint::new().column("b", ColumnType::Integer);
        let err: dataprep_core::Error = Loader::default()
            .load_with("data", &path, FileFormat::Csv, &hint)
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_missing_file_is_format_error() {
        let err: dataprep_core::Error = Loader::default()
            .load(Path::new("/nonexistent/trips.parquet"), FileFormat::Parquet)
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_csv_declared_as_parquet_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.csv");
        fs::write(&path, "LocationID,Borough\n1,EWR\n").unwrap();

        let err: dataprep_core::Error = Loader::default()
            .load(&path, FileFormat::Parquet)
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_detect_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.csv");
        fs::write(&path, "LocationID\n1\n").unwrap();

        assert_eq!(Loader::default().load_detected(&path).unwrap().format(), FileFormat::Csv);
        assert!(Loader::default().load_detected(&dir.path().join("zones.json")).is_err());
    }
}
