//! Conversions from DuckDB values and errors

use chrono::{DateTime, NaiveDate};
use duckdb::types::{TimeUnit, ValueRef};

use dataprep_core::{Error, Value};

/// Days from 0001-01-01 (day 1 of the common era) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Longest SQL excerpt carried in an error message
const SQL_PREVIEW_CHARS: usize = 120;

/// Convert one DuckDB cell into a [`Value`]
pub(crate) fn convert_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Missing,
        ValueRef::Boolean(b) => Value::Boolean(b),
        ValueRef::TinyInt(i) => Value::Integer(i.into()),
        ValueRef::SmallInt(i) => Value::Integer(i.into()),
        ValueRef::Int(i) => Value::Integer(i.into()),
        ValueRef::BigInt(i) => Value::Integer(i),
        ValueRef::HugeInt(i) => match i64::try_from(i) {
            Ok(n) => Value::Integer(n),
            Err(_) => Value::Text(i.to_string()),
        },
        ValueRef::UTinyInt(i) => Value::Integer(i.into()),
        ValueRef::USmallInt(i) => Value::Integer(i.into()),
        ValueRef::UInt(i) => Value::Integer(i.into()),
        ValueRef::UBigInt(i) => match i64::try_from(i) {
            Ok(n) => Value::Integer(n),
            Err(_) => Value::Text(i.to_string()),
        },
        ValueRef::Float(f) => Value::Float(f.into()),
        ValueRef::Double(f) => Value::Float(f),
        ValueRef::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map_or_else(|_| Value::Text(d.to_string()), Value::Float),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Date32(days) => days
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map_or(Value::Missing, Value::Date),
        ValueRef::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.checked_mul(1_000_000),
                TimeUnit::Millisecond => raw.checked_mul(1_000),
                TimeUnit::Microsecond => Some(raw),
                TimeUnit::Nanosecond => Some(raw / 1_000),
            };
            micros
                .and_then(DateTime::from_timestamp_micros)
                .map_or(Value::Missing, |ts| Value::Timestamp(ts.naive_utc()))
        }
        other => Value::Text(format!("{other:?}")),
    }
}

/// Map a DuckDB failure onto the error kinds callers act on
pub(crate) fn classify_error(sql: &str, err: &duckdb::Error) -> Error {
    classify_message(sql, err.to_string())
}

fn classify_message(sql: &str, message: String) -> Error {
    if message.contains("Out of Memory") {
        Error::OutOfMemory(message)
    } else if message.contains("IO Error")
        || message.contains("Conversion Error")
        || message.contains("Invalid Input Error")
    {
        Error::Format(message)
    } else {
        Error::Engine(format!("{message} (query: {})", sql_preview(sql)))
    }
}

fn sql_preview(sql: &str) -> String {
    if sql.chars().count() > SQL_PREVIEW_CHARS {
        let head: String = sql.chars().take(SQL_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        sql.to_string()
    }
}
