//! Error types for fetchers and loaders

use std::path::PathBuf;

use thiserror::Error;

/// Error type for fetchers and loaders
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] dataprep_core::Error),

    /// Transfer failed before the body was complete
    #[error("Network error fetching {url}: {message}")]
    Network {
        /// Requested URL
        url: String,
        /// What went wrong
        message: String,
    },

    /// Server answered with a non-success status
    #[error("HTTP status {status} fetching {url}")]
    Status {
        /// Requested URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// Destination could not be created, written or renamed
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Path that failed
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: std::io::Error,
    },

    /// CSV format error
    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        /// File being read
        path: PathBuf,
        /// Parser failure
        #[source]
        source: csv::Error,
    },

    /// Parquet format error
    #[error("Parquet error in {}: {message}", path.display())]
    Parquet {
        /// File being read
        path: PathBuf,
        /// Reader failure
        message: String,
    },

    /// Zip archive error
    #[error("Archive error in {}: {message}", path.display())]
    Archive {
        /// Archive being read
        path: PathBuf,
        /// Reader failure
        message: String,
    },

    /// File content does not match what was expected of it
    #[error("Format error: {0}")]
    Format(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn network(url: &str, message: impl ToString) -> Self {
        Self::Network {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<Error> for dataprep_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(inner) => inner,
            Error::Network { .. } | Error::Status { .. } => Self::Network(err.to_string()),
            Error::Filesystem { path, source } => Self::Filesystem { path, source },
            Error::Csv { .. } | Error::Parquet { .. } | Error::Archive { .. } | Error::Format(_) => {
                Self::Format(err.to_string())
            }
            Error::InvalidArgument(message) => Self::InvalidArgument(message),
        }
    }
}

/// Result type for fetchers and loaders
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use dataprep_core::ErrorKind;
    use test_case::test_case;

    #[test_case(Error::network("https://x", "timed out"), ErrorKind::Network ; "network")]
    #[test_case(Error::Status { url: "https://x".into(), status: 404 }, ErrorKind::Network ; "status")]
    #[test_case(Error::filesystem("/x", std::io::ErrorKind::PermissionDenied.into()), ErrorKind::Filesystem ; "filesystem")]
    #[test_case(Error::Format("no PAR1 magic".into()), ErrorKind::Format ; "format")]
    #[test_case(Error::Archive { path: "/a.zip".into(), message: "bad".into() }, ErrorKind::Format ; "archive")]
    fn test_kind_mapping(err: Error, kind: ErrorKind) {
        let core: dataprep_core::Error = err.into();
        assert_eq!(core.kind(), kind);
    }
}
