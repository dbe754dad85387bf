//! Walkthroughs over public datasets
//!
//! Each walkthrough downloads its data once, loads it, and prints a few
//! previews built from query verbs and raw SQL. The query-building steps live
//! in [`census`] and [`taxi`] so they can be exercised on small fixtures.

#![warn(missing_docs)]

pub mod census;
pub mod taxi;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dataprep_core::{Error, Result, ResultTable, SessionConfig};
use dataprep_readers::{CsvOptions, FetchOptions};

/// Default location of the configuration file, relative to the working
/// directory
pub const CONFIG_FILE: &str = "dataprep.json";

/// Configuration shared by the walkthrough binaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotebookConfig {
    /// Where downloads and extracted files are kept
    pub data_dir: PathBuf,

    /// Query session settings
    pub session: SessionConfig,

    /// HTTP settings
    pub fetch: FetchOptions,

    /// CSV reading settings
    pub csv: CsvOptions,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            session: SessionConfig::default(),
            fetch: FetchOptions::default(),
            csv: CsvOptions::default(),
        }
    }
}

impl NotebookConfig {
    /// Read `path`, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::filesystem(path, e)),
        };
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.session.validate()?;
        Ok(config)
    }
}

/// Install the fmt subscriber used by the binaries
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
}

/// Print a titled result table
pub fn show(title: &str, table: &ResultTable) {
    println!("\n=== {title} ===");
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataprep_core::ExecutionPolicy;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = NotebookConfig::load_or_default(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, NotebookConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{"data_dir": "/tmp/dp", "session": {"threads": 2, "policy": "eager"}, "csv": {"schema_inference_rows": 50}}"#,
        )
        .unwrap();

        let config = NotebookConfig::load_or_default(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/dp"));
        assert_eq!(config.session.threads, Some(2));
        assert_eq!(config.session.policy, ExecutionPolicy::Eager);
        assert_eq!(config.csv.schema_inference_rows, 50);
        assert_eq!(config.csv.delimiter, b',');
        assert_eq!(config.fetch, FetchOptions::default());
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"session": {"threads": 0}}"#).unwrap();
        assert!(matches!(NotebookConfig::load_or_default(&path), Err(Error::Config(_))));

        fs::write(&path, "{").unwrap();
        assert!(matches!(NotebookConfig::load_or_default(&path), Err(Error::Config(_))));
    }
}
