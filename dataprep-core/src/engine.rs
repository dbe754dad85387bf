//! The seam between lazy queries and the embedded database

use crate::cancel::CancellationToken;
use crate::dataset::DatasetReference;
use crate::error::Result;
use crate::result::ResultTable;

/// Options for one statement execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Stop after this many rows (`None` = all rows)
    pub row_limit: Option<usize>,

    /// Checked before execution and while rows are drained
    pub cancellation: CancellationToken,
}

impl ExecutionOptions {
    /// Options for a bounded preview
    pub fn preview(rows: usize) -> Self {
        Self {
            row_limit: Some(rows),
            ..Self::default()
        }
    }

    /// Attach a cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// An embedded analytical database.
///
/// Implementations own SQL parsing, planning and file scanning; callers only
/// register datasets and hand over SQL text.
pub trait QueryEngine: Send + Sync {
    /// Make `dataset` queryable under its name. Registering the same
    /// reference twice is a no-op; a different dataset under a name already
    /// in use is an [`Error::InvalidArgument`](crate::Error::InvalidArgument).
    fn register(&self, dataset: &DatasetReference) -> Result<()>;

    /// Execute one SQL statement and materialize its rows
    fn execute(&self, sql: &str, options: &ExecutionOptions) -> Result<ResultTable>;
}
