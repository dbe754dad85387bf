//! Session configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::ExecutionPolicy;

/// Configuration for a query session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Engine memory limit, in the engine's own notation ("4GB")
    pub memory_limit: Option<String>,

    /// Engine worker threads (`None` = engine default)
    pub threads: Option<usize>,

    /// Largest result a full collect may materialize, in bytes
    pub max_result_bytes: usize,

    /// Default row count for previews
    pub preview_rows: usize,

    /// Execution policy of new queries
    pub policy: ExecutionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            memory_limit: None,
            threads: None,
            max_result_bytes: 512 * 1024 * 1024,
            preview_rows: 10,
            policy: ExecutionPolicy::Deferred,
        }
    }
}

impl SessionConfig {
    /// Parse from JSON text; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;
        Self::from_json(&text)
    }

    /// Reject settings no engine can honor
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(Error::Config("threads must be at least 1".into()));
        }
        if self.max_result_bytes == 0 {
            return Err(Error::Config("max_result_bytes must be positive".into()));
        }
        if let Some(limit) = &self.memory_limit {
            let valid = !limit.is_empty()
                && limit.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == ' ');
            if !valid {
                return Err(Error::Config(format!("invalid memory_limit '{limit}'")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SessionConfig::from_json(r#"{"threads": 2, "policy": "eager"}"#).unwrap();
        assert_eq!(config.threads, Some(2));
        assert_eq!(config.policy, ExecutionPolicy::Eager);
        assert_eq!(config.preview_rows, 10);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(SessionConfig::from_json(r#"{"threads": 0}"#), Err(Error::Config(_))));
        assert!(matches!(
            SessionConfig::from_json(r#"{"memory_limit": "1GB'; DROP"}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(SessionConfig::from_json("not json"), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"memory_limit": "2GB"}}"#).unwrap();
        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.memory_limit.as_deref(), Some("2GB"));
    }

    #[test]
    fn test_missing_file_is_filesystem_error() {
        let err = SessionConfig::from_file(Path::new("/nonexistent/dataprep.json")).unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));
    }
}
