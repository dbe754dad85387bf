//! Sessions: an engine plus the defaults new queries start from

use std::sync::Arc;

use tracing::info;

use crate::config::SessionConfig;
use crate::dataset::DatasetReference;
use crate::engine::{ExecutionOptions, QueryEngine};
use crate::error::Result;
use crate::query::{ExecutionPolicy, LazyQuery};
use crate::result::ResultTable;

/// Entry point for queries against one engine
#[derive(Clone)]
pub struct Session {
    engine: Arc<dyn QueryEngine>,
    config: SessionConfig,
}

impl Session {
    /// Wrap an engine
    pub fn new(engine: Arc<dyn QueryEngine>, config: SessionConfig) -> Self {
        Self { engine, config }
    }

    /// Configuration this session was built with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The same session with another default policy
    #[must_use]
    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Register `dataset` and start a lazy query over it
    pub fn table(&self, dataset: &Arc<DatasetReference>) -> Result<LazyQuery> {
        self.engine.register(dataset)?;
        info!(
            dataset = dataset.name(),
            format = %dataset.format(),
            columns = dataset.schema().len(),
            "dataset registered"
        );
        LazyQuery::scan(dataset.clone(), self.engine.clone(), self.config.policy)
    }

    /// Run raw SQL and materialize every row
    pub fn sql(&self, sql: &str) -> Result<ResultTable> {
        self.engine.execute(sql, &ExecutionOptions::default())
    }

    /// Run raw SQL and keep at most `rows` rows
    pub fn sql_preview(&self, sql: &str, rows: usize) -> Result<ResultTable> {
        let table = self.engine.execute(sql, &ExecutionOptions::preview(rows))?;
        Ok(table.head(rows))
    }
}
