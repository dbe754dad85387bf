//! Row-level expressions used by filter and project operations
//!
//! Expressions are plain values built with [`col`] and [`lit`] and combined
//! with comparison methods or the arithmetic operators:
//!
//! ```
//! use dataprep_core::expr::{col, lit};
//!
//! let adults = col("Age").gt_eq(lit(18)).and(col("Area").not_eq(lit("9999")));
//! let per_km = col("fare_amount") / col("trip_distance");
//! # let _ = (adults, per_km);
//! ```

use std::fmt;
use std::ops;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{ColumnType, Schema};
use crate::value::{quote_ident, Value};

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/` (always floating point)
    Divide,
}

impl BinaryOp {
    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }

    fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
        };
        f.write_str(symbol)
    }
}

/// A scalar expression over the columns of one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Column reference
    Column(String),
    /// Constant
    Literal(Value),
    /// Binary operation
    Binary {
        /// Left operand
        left: Box<Expr>,
        /// Operator
        op: BinaryOp,
        /// Right operand
        right: Box<Expr>,
    },
    /// Logical negation
    Not(Box<Expr>),
    /// `expr IS NULL`
    IsNull(Box<Expr>),
    /// `expr IS NOT NULL`
    IsNotNull(Box<Expr>),
    /// `expr [NOT] IN (values)`
    InList {
        /// Tested expression
        expr: Box<Expr>,
        /// Candidate values
        list: Vec<Value>,
        /// `NOT IN` when set
        negated: bool,
    },
    /// Conversion that yields missing instead of failing
    TryCast {
        /// Converted expression
        expr: Box<Expr>,
        /// Target type
        to: ColumnType,
    },
}

/// Reference a column by name
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

/// Wrap a constant
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

impl Expr {
    fn binary(self, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    /// `self = other`
    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    /// `self <> other`
    pub fn not_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::NotEq, other)
    }

    /// `self < other`
    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    /// `self <= other`
    pub fn lt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::LtEq, other)
    }

    /// `self > other`
    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    /// `self >= other`
    pub fn gt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::GtEq, other)
    }

    /// `self AND other`
    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    /// `self OR other`
    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    /// `self IS NULL`
    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    /// `self IS NOT NULL`
    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }

    /// `self IN (values)`
    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// `self NOT IN (values)`
    pub fn is_not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// Convert to `to`, yielding missing where the conversion fails
    pub fn try_cast(self, to: ColumnType) -> Expr {
        Expr::TryCast {
            expr: Box::new(self),
            to,
        }
    }

    /// Name of the referenced column when this is a bare column reference
    pub fn as_column(&self) -> Option<&str> {
        match self {
            Expr::Column(name) => Some(name),
            _ => None,
        }
    }

    /// Validate column references against `schema` and compute the result
    /// type. `None` means the type is unknown (a bare missing literal).
    pub fn resolve_type(&self, schema: &Schema) -> Result<Option<ColumnType>> {
        match self {
            Expr::Column(name) => Ok(Some(schema.field_by_name(name)?.column_type())),
            Expr::Literal(value) => Ok(value.column_type()),
            Expr::Binary { left, op, right } => {
                let lt = left.resolve_type(schema)?;
                let rt = right.resolve_type(schema)?;
                if op.is_comparison() {
                    return Ok(Some(ColumnType::Boolean));
                }
                if op.is_logical() {
                    expect_boolean(lt, self)?;
                    expect_boolean(rt, self)?;
                    return Ok(Some(ColumnType::Boolean));
                }
                match (lt, rt) {
                    (Some(a), Some(b)) => match a.arithmetic_result(b) {
                        Some(_) if *op == BinaryOp::Divide => Ok(Some(ColumnType::Float)),
                        Some(result) => Ok(Some(result)),
                        None => Err(Error::Schema(format!(
                            "arithmetic on non-numeric operands ({a} {op} {b}) in {self}"
                        ))),
                    },
                    (Some(t), None) | (None, Some(t)) if !t.is_numeric() => Err(Error::Schema(format!(
                        "arithmetic on non-numeric operand ({t}) in {self}"
                    ))),
                    (Some(t), None) | (None, Some(t)) => Ok(Some(t)),
                    (None, None) => Ok(None),
                }
            }
            Expr::Not(inner) => {
                expect_boolean(inner.resolve_type(schema)?, self)?;
                Ok(Some(ColumnType::Boolean))
            }
            Expr::IsNull(inner) | Expr::IsNotNull(inner) | Expr::InList { expr: inner, .. } => {
                inner.resolve_type(schema)?;
                Ok(Some(ColumnType::Boolean))
            }
            Expr::TryCast { expr, to } => {
                expr.resolve_type(schema)?;
                Ok(Some(*to))
            }
        }
    }

    /// Render as SQL
    pub fn to_sql(&self) -> String {
        match self {
            Expr::Column(name) => quote_ident(name),
            Expr::Literal(value) => value.to_sql(),
            Expr::Binary { left, op, right } => {
                format!("({} {} {})", left.to_sql(), op, right.to_sql())
            }
            Expr::Not(inner) => format!("(NOT {})", inner.to_sql()),
            Expr::IsNull(inner) => format!("({} IS NULL)", inner.to_sql()),
            Expr::IsNotNull(inner) => format!("({} IS NOT NULL)", inner.to_sql()),
            Expr::InList { expr, list, negated } => {
                if list.is_empty() {
                    // IN () is not valid SQL
                    let constant = if *negated { "TRUE" } else { "FALSE" };
                    return constant.to_string();
                }
                let values = list.iter().map(Value::to_sql).collect::<Vec<_>>().join(", ");
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("({} {} ({}))", expr.to_sql(), keyword, values)
            }
            Expr::TryCast { expr, to } => format!("TRY_CAST({} AS {})", expr.to_sql(), to.sql_name()),
        }
    }
}

fn expect_boolean(column_type: Option<ColumnType>, expr: &Expr) -> Result<()> {
    match column_type {
        None | Some(ColumnType::Boolean) => Ok(()),
        Some(other) => Err(Error::Schema(format!(
            "expected a boolean operand, found {other} in {expr}"
        ))),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

impl ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Plus, rhs)
    }
}

impl ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Minus, rhs)
    }
}

impl ops::Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Multiply, rhs)
    }
}

impl ops::Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Divide, rhs)
    }
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    fn trips() -> Schema {
        Schema::new(vec![
            Field::new("PULocationID", ColumnType::Integer),
            Field::new("fare_amount", ColumnType::Float),
            Field::new("store_and_fwd_flag", ColumnType::String),
        ])
        .unwrap()
    }

    #[test]
    fn test_render_nested_predicate() {
        let predicate = col("fare_amount")
            .gt(lit(0.0))
            .and(col("store_and_fwd_flag").is_in(["N", "Y"]));
        assert_eq!(
            predicate.to_sql(),
            "((\"fare_amount\" > 0.0) AND (\"store_and_fwd_flag\" IN ('N', 'Y')))"
        );
    }

    #[test]
    fn test_unknown_column_is_schema_error() {
        let err = col("tip").gt(lit(1)).resolve_type(&trips()).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_arithmetic_types() {
        let schema = trips();
        assert_eq!(
            (col("PULocationID") + lit(1)).resolve_type(&schema).unwrap(),
            Some(ColumnType::Integer)
        );
        assert_eq!(
            (col("PULocationID") / lit(2)).resolve_type(&schema).unwrap(),
            Some(ColumnType::Float)
        );
        assert!((col("store_and_fwd_flag") * lit(2)).resolve_type(&schema).is_err());
    }

    #[test]
    fn test_logical_operands_must_be_boolean() {
        let err = col("fare_amount").and(lit(true)).resolve_type(&trips()).unwrap_err();
        assert!(err.to_string().contains("boolean"));
        assert!((!col("fare_amount").gt(lit(3))).resolve_type(&trips()).is_ok());
    }

    #[test]
    fn test_empty_in_list() {
        assert_eq!(col("PULocationID").is_in(Vec::<i64>::new()).to_sql(), "FALSE");
        assert_eq!(col("PULocationID").is_not_in(Vec::<i64>::new()).to_sql(), "TRUE");
    }

    #[test]
    fn test_try_cast() {
        let expr = col("store_and_fwd_flag").try_cast(ColumnType::Integer);
        assert_eq!(expr.to_sql(), "TRY_CAST(\"store_and_fwd_flag\" AS BIGINT)");
        assert_eq!(expr.resolve_type(&trips()).unwrap(), Some(ColumnType::Integer));
    }
}
