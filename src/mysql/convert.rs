// ABOUTME: MySQL native value -> SqlValue conversion, driven by result-set
// ABOUTME: column metadata (DECIMAL/JSON arrive as bytes and need the type)

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::Value;
use rust_decimal::Decimal;

use crate::row::SqlValue;

/// Column metadata captured from the result set, enough to disambiguate the
/// byte-payload cases (DECIMAL vs TEXT vs BLOB vs JSON).
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
}

impl ColumnMeta {
    pub fn from_column(column: &mysql_async::Column) -> Self {
        Self {
            name: column.name_str().into_owned(),
            column_type: column.column_type(),
            flags: column.flags(),
        }
    }
}

/// Convert one fetched row into positionally-aligned `SqlValue`s.
pub fn convert_row(row: mysql_async::Row, columns: &[ColumnMeta]) -> Result<Vec<SqlValue>> {
    let values = row.unwrap();
    if values.len() != columns.len() {
        bail!(
            "row has {} values but result set has {} columns",
            values.len(),
            columns.len()
        );
    }
    values
        .into_iter()
        .zip(columns)
        .map(|(value, meta)| {
            convert_value(value, meta)
                .with_context(|| format!("failed to convert column '{}'", meta.name))
        })
        .collect()
}

/// Convert a single MySQL value using its column's metadata.
pub fn convert_value(value: Value, meta: &ColumnMeta) -> Result<SqlValue> {
    let converted = match value {
        Value::NULL => SqlValue::Null,
        Value::Int(i) => SqlValue::Int(i),
        Value::UInt(u) => {
            let i = i64::try_from(u)
                .with_context(|| format!("unsigned value {} exceeds supported integer range", u))?;
            SqlValue::Int(i)
        }
        Value::Float(f) => SqlValue::Float(f as f64),
        Value::Double(d) => SqlValue::Float(d),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            // MySQL's zero date stands in for "no value" under permissive
            // SQL modes; carry it as NULL rather than failing the fetch.
            if year == 0 && month == 0 && day == 0 {
                SqlValue::Null
            } else {
                let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                    .with_context(|| {
                        format!("invalid date {:04}-{:02}-{:02}", year, month, day)
                    })?;
                if meta.column_type == ColumnType::MYSQL_TYPE_DATE {
                    SqlValue::Date(date)
                } else {
                    let ts = date
                        .and_hms_micro_opt(hour as u32, minute as u32, second as u32, micros)
                        .with_context(|| {
                            format!("invalid time {:02}:{:02}:{:02}", hour, minute, second)
                        })?;
                    SqlValue::DateTime(ts)
                }
            }
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = days * 24 + hours as u32;
            let sign = if negative { "-" } else { "" };
            if micros == 0 {
                SqlValue::Text(format!(
                    "{}{:02}:{:02}:{:02}",
                    sign, total_hours, minutes, seconds
                ))
            } else {
                SqlValue::Text(format!(
                    "{}{:02}:{:02}:{:02}.{:06}",
                    sign, total_hours, minutes, seconds, micros
                ))
            }
        }
        Value::Bytes(bytes) => convert_bytes(bytes, meta)?,
    };
    Ok(converted)
}

fn convert_bytes(bytes: Vec<u8>, meta: &ColumnMeta) -> Result<SqlValue> {
    let converted = match meta.column_type {
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            let text = std::str::from_utf8(&bytes).context("invalid UTF-8 in decimal value")?;
            let decimal = text
                .trim()
                .parse::<Decimal>()
                .with_context(|| format!("invalid decimal value '{}'", text.trim()))?;
            SqlValue::Decimal(decimal)
        }
        ColumnType::MYSQL_TYPE_JSON => {
            SqlValue::Json(serde_json::from_slice(&bytes).context("invalid JSON value")?)
        }
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_STRING
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_VARCHAR
            if meta.flags.contains(ColumnFlags::BINARY_FLAG) =>
        {
            SqlValue::Bytes(bytes)
        }
        _ => match String::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text),
            // Mis-flagged binary payload; keep the raw bytes.
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        },
    };
    Ok(converted)
}

/// Render a chrono timestamp back into a MySQL DATETIME value for use as a
/// query parameter.
pub fn datetime_to_value(ts: &NaiveDateTime) -> Value {
    use chrono::{Datelike, Timelike};
    Value::Date(
        ts.year() as u16,
        ts.month() as u8,
        ts.day() as u8,
        ts.hour() as u8,
        ts.minute() as u8,
        ts.second() as u8,
        ts.nanosecond() / 1_000,
    )
}
