// ABOUTME: Fixed-schema row representation shared by row sources and sinks
// ABOUTME: A RowSet pairs ordered column names with positionally-aligned rows

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::sync::watermark::Watermark;

/// A single column value, decoupled from any driver's native value type.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Date(_) => "date",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::Json(_) => "json",
        }
    }

    /// Interpret this value as a watermark candidate.
    ///
    /// NULL yields `None`. Only timestamp-like and integer values are
    /// orderable enough to serve as a change-column value; anything else is
    /// an error (the change column is misconfigured).
    pub fn as_watermark(&self) -> Result<Option<Watermark>> {
        match self {
            SqlValue::Null => Ok(None),
            SqlValue::Int(v) => Ok(Some(Watermark::Version(*v))),
            SqlValue::DateTime(ts) => Ok(Some(Watermark::Timestamp(*ts))),
            SqlValue::Date(d) => Ok(Some(Watermark::Timestamp(d.and_time(NaiveTime::MIN)))),
            other => bail!(
                "change column value of type '{}' is not orderable",
                other.type_name()
            ),
        }
    }
}

/// One fetch's worth of rows: an ordered column-name list plus rows whose
/// values align positionally with those names.
///
/// Produced once by a row source, consumed once by a row sink. There is no
/// lifecycle beyond a single synchronization attempt.
#[derive(Debug, Clone)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name. Column names are matched
    /// case-insensitively since MySQL reports them with inconsistent casing
    /// depending on server configuration.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Check positional alignment: every row must carry exactly one value
    /// per column. Rather than trusting positional alignment blindly, sinks
    /// call this before generating any SQL.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            bail!("row set has no columns");
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                bail!(
                    "row {} has {} values but the row set has {} columns",
                    i,
                    row.len(),
                    self.columns.len()
                );
            }
        }
        Ok(())
    }

    /// Maximum change-column value across all rows, ignoring NULLs.
    ///
    /// Returns `Ok(None)` when every row has a NULL change value. Errors if
    /// the column is missing, a value is not orderable, or two rows carry
    /// values of different kinds (timestamp in one row, integer in another).
    pub fn max_change_value(&self, column: &str) -> Result<Option<Watermark>> {
        let idx = match self.column_index(column) {
            Some(idx) => idx,
            None => bail!("change column '{}' not present in fetched columns", column),
        };

        let mut max: Option<Watermark> = None;
        for row in &self.rows {
            let candidate = match row.get(idx) {
                Some(value) => value.as_watermark()?,
                None => None,
            };
            let Some(candidate) = candidate else { continue };
            max = match max {
                None => Some(candidate),
                Some(current) => match current.partial_cmp(&candidate) {
                    Some(std::cmp::Ordering::Less) => Some(candidate),
                    Some(_) => Some(current),
                    None => bail!(
                        "change column '{}' mixes incompatible value kinds ({} vs {})",
                        column,
                        current.kind(),
                        candidate.kind()
                    ),
                },
            };
        }
        Ok(max)
    }
}
