// ABOUTME: Watermark value type and the durable per-table watermark store
// ABOUTME: trait - the high-water mark of successfully committed change values

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// The highest change-column value known to be fully committed to the
/// warehouse for one table.
///
/// Change columns come in two shapes: DATETIME-like audit columns and
/// integer version counters. The two are deliberately not comparable with
/// each other; a table whose stored watermark kind differs from what its
/// rows now carry has had its configuration changed out from under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Watermark {
    Timestamp(NaiveDateTime),
    Version(i64),
}

impl Watermark {
    pub fn kind(&self) -> &'static str {
        match self {
            Watermark::Timestamp(_) => "timestamp",
            Watermark::Version(_) => "version",
        }
    }
}

impl PartialOrd for Watermark {
    /// Ordered only within a kind; `None` across kinds.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Watermark::Timestamp(a), Watermark::Timestamp(b)) => a.partial_cmp(b),
            (Watermark::Version(a), Watermark::Version(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watermark::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S%.6f")),
            Watermark::Version(v) => write!(f, "{}", v),
        }
    }
}

impl FromStr for Watermark {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            bail!("watermark value is empty");
        }

        if trimmed
            .strip_prefix('-')
            .unwrap_or(trimmed)
            .chars()
            .all(|c| c.is_ascii_digit())
        {
            return Ok(Watermark::Version(trimmed.parse::<i64>()?));
        }

        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(Watermark::Timestamp(ts));
            }
        }
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Watermark::Timestamp(d.and_time(NaiveTime::MIN)));
        }

        bail!("cannot parse watermark value '{}'", trimmed)
    }
}

/// Durable mapping from table name to last-synchronized change value.
///
/// `set` must be an atomic upsert keyed on the table name: a reader must
/// never observe two watermark rows for one table, or none at all between a
/// delete and an insert.
#[async_trait]
pub trait WatermarkStore: Send {
    async fn get(&self, table_name: &str) -> Result<Option<Watermark>>;
    async fn set(&mut self, table_name: &str, value: &Watermark) -> Result<()>;
}
