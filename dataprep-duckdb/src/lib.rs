//! DuckDB query engine for dataprep pipelines
//!
//! Implements [`dataprep_core::QueryEngine`] on an embedded, in-memory DuckDB
//! database. DuckDB does all scanning, planning and execution; this crate
//! registers datasets as views and turns result rows into
//! [`dataprep_core::ResultTable`]s.

#![warn(missing_docs)]

mod convert;
pub mod engine;

use std::sync::Arc;

use dataprep_core::{Result, Session, SessionConfig};

pub use engine::{view_sql, DuckDbEngine};

/// Open a session backed by a fresh in-memory DuckDB database
pub fn open_session(config: SessionConfig) -> Result<Session> {
    let engine = DuckDbEngine::open(&config)?;
    Ok(Session::new(Arc::new(engine), config))
}
