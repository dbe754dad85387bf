//! [`QueryEngine`] backed by an in-memory DuckDB connection

use std::collections::HashMap;
use std::time::Instant;

use duckdb::Connection;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use dataprep_core::memory::estimate_row_bytes;
use dataprep_core::value::{quote_ident, quote_literal, MISSING_MARKER};
use dataprep_core::{
    DatasetReference, Error, ExecutionOptions, FileFormat, MemoryBudget, QueryEngine, Result,
    ResultTable, SessionConfig,
};

use crate::convert::{classify_error, convert_value};

/// Rows drained between two cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// DuckDB-backed query engine.
///
/// Datasets are exposed as views over DuckDB's own file scanners, so nothing
/// is read until a statement needs it.
pub struct DuckDbEngine {
    connection: Mutex<Connection>,
    registered: Mutex<HashMap<String, DatasetReference>>,
    max_result_bytes: usize,
}

impl DuckDbEngine {
    /// Open an in-memory database configured from `config`
    pub fn open(config: &SessionConfig) -> Result<Self> {
        config.validate()?;

        let connection = Connection::open_in_memory()
            .map_err(|e| Error::Engine(format!("failed to open DuckDB: {e}")))?;

        // The bundled build ships its extensions; only loading is needed.
        apply_setup(&connection, "SET autoinstall_known_extensions=false; SET autoload_known_extensions=true;");
        apply_setup(&connection, "LOAD parquet;");

        if let Some(limit) = &config.memory_limit {
            connection
                .execute_batch(&format!("SET memory_limit = {};", quote_literal(limit)))
                .map_err(|e| Error::Config(format!("memory_limit {limit}: {e}")))?;
        }
        if let Some(threads) = config.threads {
            connection
                .execute_batch(&format!("SET threads = {threads};"))
                .map_err(|e| Error::Config(format!("threads {threads}: {e}")))?;
        }

        info!(
            memory_limit = config.memory_limit.as_deref().unwrap_or("default"),
            threads = config.threads,
            max_result_bytes = config.max_result_bytes,
            "DuckDB engine initialized"
        );

        Ok(Self {
            connection: Mutex::new(connection),
            registered: Mutex::new(HashMap::new()),
            max_result_bytes: config.max_result_bytes,
        })
    }

    /// Open an engine with default settings
    pub fn open_default() -> Result<Self> {
        Self::open(&SessionConfig::default())
    }
}

/// Run a setup statement whose failure leaves the engine usable. Returns
/// whether it succeeded.
fn apply_setup(connection: &Connection, sql: &str) -> bool {
    match connection.execute_batch(sql) {
        Ok(()) => true,
        Err(e) => {
            warn!(sql, error = %e, "DuckDB setup statement failed");
            false
        }
    }
}

/// Statement creating the view behind `dataset`.
///
/// CSV columns are scanned as text and cast to their schema types. Columns
/// whose type the caller declared use `TRY_CAST`, so a value that does not
/// fit (a suppression marker such as `..C`) becomes missing. Inferred
/// columns use `CAST`, so such a value fails the scan with a format error.
/// The missing marker reads as missing either way.
pub fn view_sql(dataset: &DatasetReference) -> String {
    let path = quote_literal(&dataset.path().to_string_lossy());
    let schema = dataset.schema();

    let select_list = schema
        .fields()
        .iter()
        .map(|field| {
            let name = quote_ident(field.name());
            let sql_type = field.column_type().sql_name();
            let is_csv = dataset.format() == FileFormat::Csv;
            if is_csv && field.column_type().is_textual() {
                name
            } else if dataset.is_declared(field.name()) {
                format!("TRY_CAST({name} AS {sql_type}) AS {name}")
            } else if is_csv {
                format!("CAST(NULLIF({name}, {}) AS {sql_type}) AS {name}", quote_literal(MISSING_MARKER))
            } else {
                format!("CAST({name} AS {sql_type}) AS {name}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let scan = match dataset.format() {
        FileFormat::Csv => {
            let dialect = dataset.csv_dialect();
            let columns = schema
                .fields()
                .iter()
                .map(|field| format!("{}: 'VARCHAR'", quote_literal(field.name())))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "read_csv({path}, header = {}, delim = {}, auto_detect = false, columns = {{{columns}}})",
                dialect.has_header,
                quote_literal(&char::from(dialect.delimiter).to_string()),
            )
        }
        FileFormat::Parquet => format!("read_parquet({path})"),
    };

    format!(
        "CREATE OR REPLACE VIEW {} AS SELECT {select_list} FROM {scan}",
        quote_ident(dataset.name())
    )
}

impl QueryEngine for DuckDbEngine {
    fn register(&self, dataset: &DatasetReference) -> Result<()> {
        let mut registered = self.registered.lock();
        if let Some(existing) = registered.get(dataset.name()) {
            if existing == dataset {
                debug!(dataset = dataset.name(), "already registered");
                return Ok(());
            }
            // Queries already built over the name must keep reading the same file
            return Err(Error::InvalidArgument(format!(
                "dataset name '{}' is already bound to {}; load {} under another name",
                dataset.name(),
                existing.path().display(),
                dataset.path().display()
            )));
        }

        let sql = view_sql(dataset);
        debug!(dataset = dataset.name(), sql = %sql, "registering view");
        self.connection
            .lock()
            .execute_batch(&sql)
            .map_err(|e| classify_error(&sql, &e))?;

        registered.insert(dataset.name().to_string(), dataset.clone());
        Ok(())
    }

    fn execute(&self, sql: &str, options: &ExecutionOptions) -> Result<ResultTable> {
        options.cancellation.check()?;
        let started = Instant::now();
        let budget = MemoryBudget::new(self.max_result_bytes);
        debug!(sql = %sql, row_limit = options.row_limit, "executing");

        let conn = self.connection.lock();
        let mut stmt = conn.prepare(sql).map_err(|e| classify_error(sql, &e))?;
        let mut rows_result = stmt.query([]).map_err(|e| classify_error(sql, &e))?;

        // Rows holds a mutable borrow on stmt, column names are read after
        // it is dropped.
        let mut rows = Vec::new();
        while options.row_limit.map_or(true, |limit| rows.len() < limit) {
            if rows.len() % CANCEL_CHECK_INTERVAL == 0 {
                options.cancellation.check()?;
            }

            let Some(row) = rows_result.next().map_err(|e| classify_error(sql, &e))? else {
                break;
            };

            let width = row.as_ref().column_count();
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let value = row.get_ref(i).map_err(|e| classify_error(sql, &e))?;
                values.push(convert_value(value));
            }

            budget.allocate(estimate_row_bytes(&values))?;
            rows.push(values);
        }
        drop(rows_result);

        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
        let table = ResultTable::new(columns, rows)?;

        debug!(
            rows = table.num_rows(),
            columns = table.num_columns(),
            bytes = budget.current_usage(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "rows drained"
        );
        Ok(table)
    }
}
