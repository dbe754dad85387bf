//! Getting data onto local disk and describing it
//!
//! This crate downloads remote files idempotently, unpacks zip archives and
//! infers schemas for CSV and Parquet files without reading their rows.

#![warn(missing_docs)]

mod atomic;
mod error;

pub mod archive;
pub mod csv;
pub mod fetch;
pub mod loader;
pub mod parquet;

pub use self::archive::{ensure_extracted, extract_all};
pub use self::csv::CsvOptions;
pub use self::fetch::{FetchOptions, FetchRequest, Fetcher, Transport};
#[cfg(feature = "http")]
pub use self::fetch::HttpTransport;
pub use self::loader::Loader;
pub use error::{Error, Result};
