//! Lazy queries: immutable chains of relational operations
//!
//! A [`LazyQuery`] starts as a scan of a registered dataset. Every verb
//! (`filter`, `join`, `project`, `aggregate`, `sort`) validates its column
//! references against the current schema and returns a new query that points
//! at the previous one; nothing runs until [`LazyQuery::collect`] or
//! [`LazyQuery::preview`] is called (or the query uses
//! [`ExecutionPolicy::Eager`]).
//!
//! Rendering a chain to SQL is a pure function of the chain, so the same
//! chain over the same dataset always produces the same statement.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::dataset::DatasetReference;
use crate::engine::{ExecutionOptions, QueryEngine};
use crate::error::{Error, Result};
use crate::expr::{col, Expr};
use crate::result::ResultTable;
use crate::schema::{ColumnType, Field, Schema};
use crate::value::quote_ident;

/// Suffix appended to right-hand join columns that collide with left names
pub const JOIN_COLLISION_SUFFIX: &str = "_right";

/// When a query is materialized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPolicy {
    /// Only on `collect` / `preview`
    #[default]
    Deferred,
    /// As soon as each query value is constructed
    Eager,
}

/// Join semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    /// Keep only rows matched on both sides
    Inner,
    /// Keep every left row; unmatched right columns become missing
    Left,
}

impl JoinKind {
    fn sql_keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// Join parameters
#[derive(Debug, Clone)]
pub struct JoinSpec {
    /// Join semantics
    pub kind: JoinKind,
    /// Right-hand input
    pub right: Arc<Plan>,
    /// Key pairs (left column, right column)
    pub on: Vec<(String, String)>,
    /// Right columns carried into the output (source name, output name);
    /// right keys are dropped and colliding names get a suffix
    pub right_columns: Vec<(String, String)>,
}

/// One output column of a projection
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Computed value
    pub expr: Expr,
    /// Output name
    pub alias: String,
}

impl Projection {
    /// Project `expr` under `alias`
    pub fn new(expr: Expr, alias: &str) -> Self {
        Self {
            expr,
            alias: alias.to_string(),
        }
    }

    /// Keep a column under its own name
    pub fn column(name: &str) -> Self {
        Self::new(col(name), name)
    }

    fn is_identity_of(&self, name: &str) -> bool {
        self.alias == name && self.expr.as_column() == Some(name)
    }
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    /// Number of rows, or of non-missing values when a column is given
    Count,
    /// Number of distinct non-missing values
    CountDistinct,
    /// Sum of a numeric column
    Sum,
    /// Arithmetic mean of a numeric column
    Mean,
    /// Smallest value
    Min,
    /// Largest value
    Max,
}

/// An aggregate function applied to a column, with an output name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reducer {
    /// Function to apply
    pub function: AggregateFunction,
    /// Input column (`None` only for a row count)
    pub column: Option<String>,
    /// Output name
    pub alias: String,
}

impl Reducer {
    fn on(function: AggregateFunction, column: &str, alias: &str) -> Self {
        Self {
            function,
            column: Some(column.to_string()),
            alias: alias.to_string(),
        }
    }

    /// `COUNT(*)`
    pub fn count(alias: &str) -> Self {
        Self {
            function: AggregateFunction::Count,
            column: None,
            alias: alias.to_string(),
        }
    }

    /// `COUNT(column)`
    pub fn count_non_missing(column: &str, alias: &str) -> Self {
        Self::on(AggregateFunction::Count, column, alias)
    }

    /// `COUNT(DISTINCT column)`
    pub fn count_distinct(column: &str, alias: &str) -> Self {
        Self::on(AggregateFunction::CountDistinct, column, alias)
    }

    /// `SUM(column)`
    pub fn sum(column: &str, alias: &str) -> Self {
        Self::on(AggregateFunction::Sum, column, alias)
    }

    /// `AVG(column)`
    pub fn mean(column: &str, alias: &str) -> Self {
        Self::on(AggregateFunction::Mean, column, alias)
    }

    /// `MIN(column)`
    pub fn min(column: &str, alias: &str) -> Self {
        Self::on(AggregateFunction::Min, column, alias)
    }

    /// `MAX(column)`
    pub fn max(column: &str, alias: &str) -> Self {
        Self::on(AggregateFunction::Max, column, alias)
    }

    fn output_type(&self, schema: &Schema) -> Result<ColumnType> {
        let input = match &self.column {
            Some(name) => Some(schema.field_by_name(name)?.column_type()),
            None if self.function == AggregateFunction::Count => None,
            None => {
                return Err(Error::Schema(format!(
                    "{:?} for '{}' needs an input column",
                    self.function, self.alias
                )))
            }
        };

        match (self.function, input) {
            (AggregateFunction::Count | AggregateFunction::CountDistinct, _) => Ok(ColumnType::Integer),
            (AggregateFunction::Sum, Some(ColumnType::Integer)) => Ok(ColumnType::Integer),
            (AggregateFunction::Sum | AggregateFunction::Mean, Some(t)) if t.is_numeric() => Ok(ColumnType::Float),
            (AggregateFunction::Min | AggregateFunction::Max, Some(t)) => Ok(t),
            (function, Some(t)) => Err(Error::Schema(format!(
                "{function:?} needs a numeric column, '{}' is {t}",
                self.column.as_deref().unwrap_or_default()
            ))),
            (function, None) => Err(Error::Schema(format!("{function:?} needs an input column"))),
        }
    }

    fn to_sql(&self) -> String {
        let argument = self.column.as_deref().map_or_else(|| "*".to_string(), quote_ident);
        let call = match self.function {
            AggregateFunction::Count => format!("COUNT({argument})"),
            AggregateFunction::CountDistinct => format!("COUNT(DISTINCT {argument})"),
            AggregateFunction::Sum => format!("SUM({argument})"),
            AggregateFunction::Mean => format!("AVG({argument})"),
            AggregateFunction::Min => format!("MIN({argument})"),
            AggregateFunction::Max => format!("MAX({argument})"),
        };
        format!("{call} AS {}", quote_ident(&self.alias))
    }
}

/// A sort key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    /// Column to order by
    pub column: String,
    /// Largest first when set
    pub descending: bool,
}

impl SortKey {
    /// Ascending order, missing values last
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: false,
        }
    }

    /// Descending order, missing values last
    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: true,
        }
    }

    fn to_sql(&self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        format!("{} {} NULLS LAST", quote_ident(&self.column), direction)
    }
}

/// The closed set of relational operations
#[derive(Debug, Clone)]
pub enum Operation {
    /// Keep rows where the predicate holds
    Filter(Expr),
    /// Combine with another query on key equality
    Join(JoinSpec),
    /// Compute output columns
    Project(Vec<Projection>),
    /// Group and reduce
    Aggregate {
        /// Grouping columns (empty = one group)
        group_by: Vec<String>,
        /// Reductions
        reducers: Vec<Reducer>,
    },
    /// Order rows
    Sort(Vec<SortKey>),
}

/// A node of a query chain; every node knows its output schema
#[derive(Debug, Clone)]
pub enum Plan {
    /// Read a registered dataset
    Scan(Arc<DatasetReference>),
    /// Apply one operation to the previous node
    Apply {
        /// Previous node
        input: Arc<Plan>,
        /// Operation applied to it
        operation: Operation,
        /// Output schema after the operation
        schema: Arc<Schema>,
    },
}

impl Plan {
    /// Output schema of this node
    pub fn schema(&self) -> &Arc<Schema> {
        match self {
            Plan::Scan(dataset) => dataset.schema(),
            Plan::Apply { schema, .. } => schema,
        }
    }

    /// Number of operations between this node and its scan
    pub fn depth(&self) -> usize {
        match self {
            Plan::Scan(_) => 0,
            Plan::Apply { input, .. } => input.depth() + 1,
        }
    }

    /// Render as a single SQL statement
    pub fn to_sql(&self) -> String {
        SqlRenderer::default().render(self).sql
    }
}

struct Rendered {
    sql: String,
    ordering: Option<Vec<SortKey>>,
}

/// Renders a plan bottom-up, wrapping each operation around its input as a
/// subquery. Aliases are numbered in visiting order, so rendering is
/// deterministic.
#[derive(Default)]
struct SqlRenderer {
    next_alias: usize,
}

impl SqlRenderer {
    fn alias(&mut self, prefix: &str) -> String {
        let alias = format!("{prefix}{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn render(&mut self, plan: &Plan) -> Rendered {
        match plan {
            Plan::Scan(dataset) => Rendered {
                sql: format!("SELECT * FROM {}", quote_ident(dataset.name())),
                ordering: None,
            },
            Plan::Apply { input, operation, .. } => {
                let rendered = self.render(input);
                self.render_operation(rendered, input.schema(), operation)
            }
        }
    }

    fn render_operation(&mut self, input: Rendered, input_schema: &Schema, operation: &Operation) -> Rendered {
        match operation {
            Operation::Filter(predicate) => {
                let alias = self.alias("q");
                let sql = format!(
                    "SELECT * FROM ({}) AS {} WHERE {}{}",
                    input.sql,
                    alias,
                    predicate.to_sql(),
                    order_by(input.ordering.as_deref())
                );
                Rendered {
                    sql,
                    ordering: input.ordering,
                }
            }
            Operation::Project(items) => {
                let alias = self.alias("q");
                // Ordering survives only if every key is passed through unchanged
                let ordering = input.ordering.filter(|keys| {
                    keys.iter()
                        .all(|key| items.iter().any(|item| item.is_identity_of(&key.column)))
                });
                let columns = items
                    .iter()
                    .map(|item| format!("{} AS {}", item.expr.to_sql(), quote_ident(&item.alias)))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "SELECT {} FROM ({}) AS {}{}",
                    columns,
                    input.sql,
                    alias,
                    order_by(ordering.as_deref())
                );
                Rendered { sql, ordering }
            }
            Operation::Join(spec) => {
                let left_alias = self.alias("l");
                let right_alias = self.alias("r");
                let right = self.render(&spec.right);

                let mut columns: Vec<String> = input_schema
                    .fields()
                    .iter()
                    .map(|field| {
                        let name = quote_ident(field.name());
                        format!("{left_alias}.{name} AS {name}")
                    })
                    .collect();
                columns.extend(spec.right_columns.iter().map(|(source, output)| {
                    format!("{right_alias}.{} AS {}", quote_ident(source), quote_ident(output))
                }));

                let condition = spec
                    .on
                    .iter()
                    .map(|(l, r)| format!("{left_alias}.{} = {right_alias}.{}", quote_ident(l), quote_ident(r)))
                    .collect::<Vec<_>>()
                    .join(" AND ");

                let sql = format!(
                    "SELECT {} FROM ({}) AS {} {} ({}) AS {} ON {}",
                    columns.join(", "),
                    input.sql,
                    left_alias,
                    spec.kind.sql_keyword(),
                    right.sql,
                    right_alias,
                    condition
                );
                Rendered { sql, ordering: None }
            }
            Operation::Aggregate { group_by, reducers } => {
                let alias = self.alias("q");
                let keys: Vec<String> = group_by.iter().map(|g| quote_ident(g)).collect();
                let mut columns = keys.clone();
                columns.extend(reducers.iter().map(Reducer::to_sql));
                let mut sql = format!("SELECT {} FROM ({}) AS {}", columns.join(", "), input.sql, alias);
                if !keys.is_empty() {
                    sql.push_str(" GROUP BY ");
                    sql.push_str(&keys.join(", "));
                }
                Rendered { sql, ordering: None }
            }
            Operation::Sort(keys) => {
                let alias = self.alias("q");
                let sql = format!("SELECT * FROM ({}) AS {}{}", input.sql, alias, order_by(Some(keys)));
                Rendered {
                    sql,
                    ordering: Some(keys.clone()),
                }
            }
        }
    }
}

fn order_by(keys: Option<&[SortKey]>) -> String {
    match keys {
        Some(keys) if !keys.is_empty() => {
            let keys = keys.iter().map(SortKey::to_sql).collect::<Vec<_>>().join(", ");
            format!(" ORDER BY {keys}")
        }
        _ => String::new(),
    }
}

/// A pending relational computation bound to an engine.
///
/// Values are immutable: each verb returns a new query and leaves `self`
/// untouched, so a query can be branched freely.
#[derive(Clone)]
pub struct LazyQuery {
    plan: Arc<Plan>,
    engine: Arc<dyn QueryEngine>,
    policy: ExecutionPolicy,
    snapshot: Option<Arc<ResultTable>>,
}

impl LazyQuery {
    /// Start a query over a dataset already registered with `engine`
    pub fn scan(
        dataset: Arc<DatasetReference>,
        engine: Arc<dyn QueryEngine>,
        policy: ExecutionPolicy,
    ) -> Result<Self> {
        Self::materialize_if_eager(Self {
            plan: Arc::new(Plan::Scan(dataset)),
            engine,
            policy,
            snapshot: None,
        })
    }

    /// Output schema
    pub fn schema(&self) -> &Arc<Schema> {
        self.plan.schema()
    }

    /// The chain behind this query
    pub fn plan(&self) -> &Arc<Plan> {
        &self.plan
    }

    /// Execution policy
    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    /// Whether an eager snapshot is held
    pub fn is_materialized(&self) -> bool {
        self.snapshot.is_some()
    }

    /// The same chain under another policy
    pub fn with_policy(&self, policy: ExecutionPolicy) -> Result<Self> {
        let query = Self {
            plan: self.plan.clone(),
            engine: self.engine.clone(),
            policy,
            snapshot: match policy {
                ExecutionPolicy::Eager => self.snapshot.clone(),
                ExecutionPolicy::Deferred => None,
            },
        };
        Self::materialize_if_eager(query)
    }

    /// SQL statement this query executes
    pub fn to_sql(&self) -> String {
        self.plan.to_sql()
    }

    /// Keep rows where `predicate` holds
    pub fn filter(&self, predicate: Expr) -> Result<Self> {
        match predicate.resolve_type(self.schema())? {
            None | Some(ColumnType::Boolean) => {}
            Some(other) => {
                return Err(Error::Schema(format!(
                    "filter predicate must be boolean, found {other}: {predicate}"
                )))
            }
        }
        let schema = self.schema().clone();
        self.apply(Operation::Filter(predicate), schema)
    }

    /// Inner join on columns present under the same name on both sides
    pub fn inner_join(&self, other: &LazyQuery, on: &[&str]) -> Result<Self> {
        self.join(other, &same_name_keys(on), JoinKind::Inner)
    }

    /// Left join on columns present under the same name on both sides
    pub fn left_join(&self, other: &LazyQuery, on: &[&str]) -> Result<Self> {
        self.join(other, &same_name_keys(on), JoinKind::Left)
    }

    /// Join on (left column, right column) pairs
    pub fn join(&self, other: &LazyQuery, on: &[(&str, &str)], kind: JoinKind) -> Result<Self> {
        if !self.same_engine(other) {
            return Err(Error::InvalidArgument(
                "cannot join queries bound to different engines".into(),
            ));
        }
        if on.is_empty() {
            return Err(Error::InvalidArgument("join needs at least one key".into()));
        }

        let left = self.schema();
        let right = other.schema();
        for (l, r) in on {
            let lt = left.field_by_name(l)?.column_type();
            let rt = right.field_by_name(r)?.column_type();
            let compatible = lt == rt || (lt.is_numeric() && rt.is_numeric()) || (lt.is_textual() && rt.is_textual());
            if !compatible {
                return Err(Error::Schema(format!(
                    "join key '{l}' ({lt}) is not comparable with '{r}' ({rt})"
                )));
            }
        }

        let mut fields: Vec<Field> = left.fields().to_vec();
        let mut right_columns = Vec::new();
        for field in right.fields() {
            if on.iter().any(|(_, r)| *r == field.name()) {
                continue;
            }
            let mut output = field.name().to_string();
            while fields.iter().any(|f| f.name() == output) {
                output.push_str(JOIN_COLLISION_SUFFIX);
            }
            fields.push(Field::new(&output, field.column_type()));
            right_columns.push((field.name().to_string(), output));
        }

        let spec = JoinSpec {
            kind,
            right: other.plan.clone(),
            on: on.iter().map(|(l, r)| ((*l).to_string(), (*r).to_string())).collect(),
            right_columns,
        };
        self.apply(Operation::Join(spec), Arc::new(Schema::new(fields)?))
    }

    /// Compute a new set of output columns
    pub fn project(&self, items: Vec<Projection>) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::InvalidArgument("projection needs at least one column".into()));
        }
        let mut fields = Vec::with_capacity(items.len());
        for item in &items {
            // A bare missing literal has no type of its own
            let column_type = item.expr.resolve_type(self.schema())?.unwrap_or(ColumnType::String);
            fields.push(Field::new(&item.alias, column_type));
        }
        let schema = Arc::new(Schema::new(fields)?);
        self.apply(Operation::Project(items), schema)
    }

    /// Keep only the named columns, in the given order
    pub fn select(&self, columns: &[&str]) -> Result<Self> {
        self.project(columns.iter().map(|c| Projection::column(c)).collect())
    }

    /// Add a computed column, or replace an existing one in place
    pub fn mutate(&self, name: &str, expr: Expr) -> Result<Self> {
        let mut items: Vec<Projection> = self
            .schema()
            .fields()
            .iter()
            .map(|f| Projection::column(f.name()))
            .collect();
        match items.iter_mut().find(|item| item.alias == name) {
            Some(existing) => existing.expr = expr,
            None => items.push(Projection::new(expr, name)),
        }
        self.project(items)
    }

    /// Rename one column, keeping the others
    pub fn rename(&self, from: &str, to: &str) -> Result<Self> {
        self.schema().index_of(from)?;
        let items = self
            .schema()
            .fields()
            .iter()
            .map(|f| {
                if f.name() == from {
                    Projection::new(col(from), to)
                } else {
                    Projection::column(f.name())
                }
            })
            .collect();
        self.project(items)
    }

    /// Group by `group_by` and apply `reducers` to each group
    pub fn aggregate(&self, group_by: &[&str], reducers: Vec<Reducer>) -> Result<Self> {
        if group_by.is_empty() && reducers.is_empty() {
            return Err(Error::InvalidArgument("aggregate needs group columns or reducers".into()));
        }
        let input = self.schema();
        let mut fields = Vec::with_capacity(group_by.len() + reducers.len());
        for name in group_by {
            fields.push(input.field_by_name(name)?.clone());
        }
        for reducer in &reducers {
            fields.push(Field::new(&reducer.alias, reducer.output_type(input)?));
        }
        let schema = Arc::new(Schema::new(fields)?);
        let operation = Operation::Aggregate {
            group_by: group_by.iter().map(|g| (*g).to_string()).collect(),
            reducers,
        };
        self.apply(operation, schema)
    }

    /// Order rows by `keys`; replaces any earlier ordering
    pub fn sort(&self, keys: Vec<SortKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::InvalidArgument("sort needs at least one key".into()));
        }
        for key in &keys {
            self.schema().index_of(&key.column)?;
        }
        let schema = self.schema().clone();
        self.apply(Operation::Sort(keys), schema)
    }

    /// Execute and return every row
    pub fn collect(&self) -> Result<ResultTable> {
        self.collect_with(&CancellationToken::new())
    }

    /// Execute and return every row, giving up once `cancellation` fires
    pub fn collect_with(&self, cancellation: &CancellationToken) -> Result<ResultTable> {
        cancellation.check()?;
        if let Some(snapshot) = &self.snapshot {
            return Ok(ResultTable::clone(snapshot));
        }
        let options = ExecutionOptions::default().with_cancellation(cancellation.clone());
        self.execute(&self.to_sql(), &options)
    }

    /// Execute and return at most the first `rows` rows
    pub fn preview(&self, rows: usize) -> Result<ResultTable> {
        if let Some(snapshot) = &self.snapshot {
            return Ok(ResultTable::clone(snapshot).head(rows));
        }
        let sql = format!("{} LIMIT {}", self.to_sql(), rows);
        let table = self.execute(&sql, &ExecutionOptions::preview(rows))?;
        Ok(table.head(rows))
    }

    fn execute(&self, sql: &str, options: &ExecutionOptions) -> Result<ResultTable> {
        debug!(sql = %sql, "executing query");
        let start = Instant::now();
        let table = self.engine.execute(sql, options)?;
        info!(
            rows = table.num_rows(),
            columns = table.num_columns(),
            operations = self.plan.depth(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "query materialized"
        );
        Ok(table)
    }

    fn apply(&self, operation: Operation, schema: Arc<Schema>) -> Result<Self> {
        let query = Self {
            plan: Arc::new(Plan::Apply {
                input: self.plan.clone(),
                operation,
                schema,
            }),
            engine: self.engine.clone(),
            policy: self.policy,
            snapshot: None,
        };
        Self::materialize_if_eager(query)
    }

    fn materialize_if_eager(mut query: Self) -> Result<Self> {
        if query.policy == ExecutionPolicy::Eager && query.snapshot.is_none() {
            let table = query.execute(&query.to_sql(), &ExecutionOptions::default())?;
            query.snapshot = Some(Arc::new(table));
        }
        Ok(query)
    }

    fn same_engine(&self, other: &LazyQuery) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.engine).cast::<()>(),
            Arc::as_ptr(&other.engine).cast::<()>(),
        )
    }
}

fn same_name_keys<'a>(on: &[&'a str]) -> Vec<(&'a str, &'a str)> {
    on.iter().map(|k| (*k, *k)).collect()
}

impl fmt::Debug for LazyQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyQuery")
            .field("sql", &self.to_sql())
            .field("policy", &self.policy)
            .field("materialized", &self.snapshot.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CsvDialect, FileFormat};
    use crate::expr::lit;
    use crate::value::Value;
    use std::sync::Mutex;

    /// Records every statement and answers with a single empty row set
    #[derive(Default)]
    struct RecordingEngine {
        statements: Mutex<Vec<String>>,
    }

    impl RecordingEngine {
        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    impl QueryEngine for RecordingEngine {
        fn register(&self, _dataset: &DatasetReference) -> Result<()> {
            Ok(())
        }

        fn execute(&self, sql: &str, _options: &ExecutionOptions) -> Result<ResultTable> {
            self.statements.lock().unwrap().push(sql.to_string());
            ResultTable::new(
                vec!["n".into()],
                (0..20).map(|i| vec![Value::Integer(i)]).collect(),
            )
        }
    }

    fn dataset(name: &str, fields: Vec<Field>) -> Arc<DatasetReference> {
        DatasetReference::new(
            name,
            format!("{name}.csv"),
            FileFormat::Csv,
            Schema::new(fields).unwrap(),
            CsvDialect::default(),
        )
        .unwrap()
    }

    fn people(engine: &Arc<RecordingEngine>, policy: ExecutionPolicy) -> LazyQuery {
        let ds = dataset(
            "a",
            vec![Field::new("id", ColumnType::Integer), Field::new("x", ColumnType::String)],
        );
        LazyQuery::scan(ds, engine.clone(), policy).unwrap()
    }

    fn labels(engine: &Arc<RecordingEngine>) -> LazyQuery {
        let ds = dataset(
            "b",
            vec![Field::new("id", ColumnType::Integer), Field::new("y", ColumnType::String)],
        );
        LazyQuery::scan(ds, engine.clone(), ExecutionPolicy::Deferred).unwrap()
    }

    #[test]
    fn test_verbs_do_not_touch_engine() {
        let engine = Arc::new(RecordingEngine::default());
        let query = people(&engine, ExecutionPolicy::Deferred)
            .filter(col("id").gt(lit(0)))
            .unwrap()
            .inner_join(&labels(&engine), &["id"])
            .unwrap()
            .mutate("id2", col("id") * lit(2))
            .unwrap()
            .aggregate(&["y"], vec![Reducer::sum("id2", "total")])
            .unwrap()
            .sort(vec![SortKey::desc("total")])
            .unwrap();

        assert!(engine.statements().is_empty());
        assert_eq!(query.plan().depth(), 5);
        assert_eq!(query.schema().names(), vec!["y", "total"]);
    }

    #[test]
    fn test_unknown_columns_fail_before_execution() {
        let engine = Arc::new(RecordingEngine::default());
        let base = people(&engine, ExecutionPolicy::Deferred);

        let errors = [
            base.filter(col("z").eq(lit(1))).unwrap_err(),
            base.select(&["id", "z"]).unwrap_err(),
            base.inner_join(&labels(&engine), &["x"]).unwrap_err(),
            base.aggregate(&["z"], vec![Reducer::count("n")]).unwrap_err(),
            base.sort(vec![SortKey::asc("z")]).unwrap_err(),
        ];
        for err in errors {
            assert!(matches!(err, Error::Schema(_)), "unexpected error: {err}");
        }
        assert!(engine.statements().is_empty());
    }

    #[test]
    fn test_sum_of_text_is_schema_error() {
        let engine = Arc::new(RecordingEngine::default());
        let err = people(&engine, ExecutionPolicy::Deferred)
            .aggregate(&["id"], vec![Reducer::sum("x", "total")])
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_filter_requires_boolean_predicate() {
        let engine = Arc::new(RecordingEngine::default());
        let err = people(&engine, ExecutionPolicy::Deferred).filter(col("id") + lit(1)).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_join_key_types_must_be_comparable() {
        let engine = Arc::new(RecordingEngine::default());
        let err = people(&engine, ExecutionPolicy::Deferred)
            .join(&labels(&engine), &[("x", "id")], JoinKind::Inner)
            .unwrap_err();
        assert!(err.to_string().contains("not comparable"));
    }

    #[test]
    fn test_join_output_columns() {
        let engine = Arc::new(RecordingEngine::default());
        let left = people(&engine, ExecutionPolicy::Deferred);
        let right = left.rename("x", "y").unwrap().mutate("x", lit("dup")).unwrap();

        let joined = left.left_join(&right, &["id"]).unwrap();
        assert_eq!(joined.schema().names(), vec!["id", "x", "y", "x_right"]);
        assert!(joined.to_sql().contains("LEFT JOIN"));
    }

    #[test]
    fn test_join_across_engines_rejected() {
        let first = Arc::new(RecordingEngine::default());
        let second = Arc::new(RecordingEngine::default());
        let err = people(&first, ExecutionPolicy::Deferred)
            .inner_join(&labels(&second), &["id"])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let engine = Arc::new(RecordingEngine::default());
        let build = || {
            people(&engine, ExecutionPolicy::Deferred)
                .inner_join(&labels(&engine), &["id"])
                .unwrap()
                .filter(col("y").not_eq(lit("p")))
                .unwrap()
                .to_sql()
        };
        assert_eq!(build(), build());
        assert_eq!(
            build(),
            "SELECT * FROM (SELECT l0.\"id\" AS \"id\", l0.\"x\" AS \"x\", r1.\"y\" AS \"y\" \
             FROM (SELECT * FROM \"a\") AS l0 INNER JOIN (SELECT * FROM \"b\") AS r1 \
             ON l0.\"id\" = r1.\"id\") AS q2 WHERE (\"y\" <> 'p')"
        );
    }

    #[test]
    fn test_ordering_survives_filter_and_identity_projection() {
        let engine = Arc::new(RecordingEngine::default());
        let sorted = people(&engine, ExecutionPolicy::Deferred)
            .sort(vec![SortKey::asc("id")])
            .unwrap();

        let filtered = sorted.filter(col("x").is_not_null()).unwrap();
        assert!(filtered.to_sql().ends_with("ORDER BY \"id\" ASC NULLS LAST"));

        let kept = filtered.select(&["id"]).unwrap();
        assert!(kept.to_sql().ends_with("ORDER BY \"id\" ASC NULLS LAST"));

        let dropped = filtered.select(&["x"]).unwrap();
        assert!(!dropped.to_sql().ends_with("NULLS LAST"));
    }

    #[test]
    fn test_branching_leaves_input_untouched() {
        let engine = Arc::new(RecordingEngine::default());
        let base = people(&engine, ExecutionPolicy::Deferred);
        let before = base.to_sql();
        let _narrow = base.select(&["x"]).unwrap();
        assert_eq!(base.to_sql(), before);
        assert_eq!(base.schema().names(), vec!["id", "x"]);
    }

    #[test]
    fn test_preview_appends_limit_and_bounds_rows() {
        let engine = Arc::new(RecordingEngine::default());
        let query = people(&engine, ExecutionPolicy::Deferred);
        let table = query.preview(5).unwrap();
        assert_eq!(table.num_rows(), 5);
        assert_eq!(engine.statements(), vec!["SELECT * FROM \"a\" LIMIT 5".to_string()]);
    }

    #[test]
    fn test_eager_materializes_on_construction() {
        let engine = Arc::new(RecordingEngine::default());
        let query = people(&engine, ExecutionPolicy::Eager);
        assert!(query.is_materialized());
        assert_eq!(engine.statements().len(), 1);

        let filtered = query.filter(col("id").gt(lit(1))).unwrap();
        assert_eq!(engine.statements().len(), 2);

        // Served from the snapshot taken at construction
        assert_eq!(filtered.collect().unwrap().num_rows(), 20);
        assert_eq!(filtered.preview(3).unwrap().num_rows(), 3);
        assert_eq!(engine.statements().len(), 2);
    }

    #[test]
    fn test_switching_policy() {
        let engine = Arc::new(RecordingEngine::default());
        let deferred = people(&engine, ExecutionPolicy::Deferred);
        let eager = deferred.with_policy(ExecutionPolicy::Eager).unwrap();
        assert!(eager.is_materialized());
        let back = eager.with_policy(ExecutionPolicy::Deferred).unwrap();
        assert!(!back.is_materialized());
        assert_eq!(engine.statements().len(), 1);
    }

    #[test]
    fn test_cancelled_collect_skips_engine() {
        let engine = Arc::new(RecordingEngine::default());
        let token = CancellationToken::new();
        token.cancel();
        let err = people(&engine, ExecutionPolicy::Deferred).collect_with(&token).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(engine.statements().is_empty());
    }
}
