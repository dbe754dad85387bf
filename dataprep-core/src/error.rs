//! Error types for dataprep pipelines

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for dataprep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for dataprep operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote resource unreachable, timed out or answered with a non-2xx status
    #[error("Network error: {0}")]
    Network(String),

    /// Destination could not be created, written or renamed
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Path that failed
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: io::Error,
    },

    /// File does not match its declared format or is unreadable
    #[error("Format error: {0}")]
    Format(String),

    /// Reference to an undeclared column or an ill-typed operation
    #[error("Schema error: {0}")]
    Schema(String),

    /// Materialization did not fit in the available memory
    #[error("Resource exhausted: requested {requested} bytes, available {available} bytes")]
    ResourceExhausted {
        /// Requested memory in bytes (0 when the engine did not say)
        requested: usize,
        /// Available memory in bytes
        available: usize,
    },

    /// The engine ran out of memory while executing a statement
    #[error("Engine out of memory: {0}")]
    OutOfMemory(String),

    /// Execution was cancelled through a cancellation token
    #[error("Execution cancelled")]
    Cancelled,

    /// The embedded engine rejected or failed a statement
    #[error("Engine error: {0}")]
    Engine(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error outside of a known destination path
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Network`]
    Network,
    /// See [`Error::Filesystem`] and [`Error::Io`]
    Filesystem,
    /// See [`Error::Format`]
    Format,
    /// See [`Error::Schema`]
    Schema,
    /// See [`Error::ResourceExhausted`] and [`Error::OutOfMemory`]
    ResourceExhausted,
    /// See [`Error::Cancelled`]
    Cancelled,
    /// See [`Error::Engine`]
    Engine,
    /// See [`Error::InvalidArgument`] and [`Error::Config`]
    Usage,
}

impl Error {
    /// Build a filesystem error for `path`
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Build a schema error naming a column missing from `available`
    pub fn unknown_column(name: &str, available: &[&str]) -> Self {
        Self::Schema(format!(
            "unknown column '{}' (available: {})",
            name,
            available.join(", ")
        ))
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) => ErrorKind::Network,
            Error::Filesystem { .. } | Error::Io(_) => ErrorKind::Filesystem,
            Error::Format(_) => ErrorKind::Format,
            Error::Schema(_) => ErrorKind::Schema,
            Error::ResourceExhausted { .. } | Error::OutOfMemory(_) => ErrorKind::ResourceExhausted,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Engine(_) => ErrorKind::Engine,
            Error::InvalidArgument(_) | Error::Config(_) => ErrorKind::Usage,
        }
    }

    /// Whether retrying with a bounded preview can succeed where a full
    /// collect failed
    pub fn is_recoverable_with_preview(&self) -> bool {
        matches!(self, Error::ResourceExhausted { .. } | Error::OutOfMemory(_))
    }
}
