//! Core types for dataprep pipelines
//!
//! This crate holds everything that does not depend on a particular engine:
//! schemas and values, the expression language, lazy query plans and their
//! SQL rendering, result tables, and the [`QueryEngine`] seam the embedded
//! database plugs into.

#![warn(missing_docs)]

pub mod cancel;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod expr;
pub mod memory;
pub mod query;
pub mod result;
pub mod schema;
pub mod session;
pub mod value;

// Re-export key types for convenience
pub use cancel::CancellationToken;
pub use config::SessionConfig;
pub use dataset::{CsvDialect, DatasetReference, FileFormat};
pub use engine::{ExecutionOptions, QueryEngine};
pub use error::{Error, ErrorKind, Result};
pub use expr::{col, lit, BinaryOp, Expr};
pub use memory::MemoryBudget;
pub use query::{ExecutionPolicy, JoinKind, LazyQuery, Projection, Reducer, SortKey};
pub use result::ResultTable;
pub use schema::{ColumnType, Field, Schema, SchemaHint};
pub use session::Session;
pub use value::Value;
