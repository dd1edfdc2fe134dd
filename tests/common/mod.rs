// Shared in-memory implementations of the sync traits, used to exercise the
// engine and coordinator without real databases.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use warehouse_replicator::config::TableConfig;
use warehouse_replicator::row::{RowSet, SqlValue};
use warehouse_replicator::sync::{RowSink, RowSource, Watermark, WatermarkStore};

pub const CUSTOMER_COLUMNS: &[&str] = &["id", "email", "updated_at"];

pub fn table(name: &str) -> TableConfig {
    TableConfig {
        name: name.to_string(),
        source_table: None,
        target_table: None,
        primary_key: "id".to_string(),
        change_column: "updated_at".to_string(),
    }
}

/// Parse "2024-01-02" or "2024-01-02 03:04:05" into a timestamp.
pub fn ts(s: &str) -> NaiveDateTime {
    if let Ok(full) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return full;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .expect("bad test timestamp")
        .and_time(NaiveTime::MIN)
}

pub fn wm(s: &str) -> Watermark {
    Watermark::Timestamp(ts(s))
}

pub fn customer_row(id: i64, email: &str, updated: Option<&str>) -> Vec<SqlValue> {
    vec![
        SqlValue::Int(id),
        SqlValue::Text(email.to_string()),
        match updated {
            Some(s) => SqlValue::DateTime(ts(s)),
            None => SqlValue::Null,
        },
    ]
}

/// Row source backed by a shared vector of rows. `fetch_changed_since`
/// filters with a strictly-greater comparison on the change column, the same
/// contract a SQL source implements with `WHERE change_col > ?`.
pub struct FakeSource {
    pub columns: Vec<String>,
    pub rows: Arc<Mutex<Vec<Vec<SqlValue>>>>,
    pub fail: bool,
    /// Return every row from `fetch_changed_since` regardless of the
    /// threshold, modeling a source whose change column is not monotonic.
    pub ignore_threshold: bool,
    pub full_fetches: Arc<AtomicUsize>,
    pub incremental_fetches: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: columns.iter().map(|s| s.to_string()).collect(),
            rows: Arc::new(Mutex::new(rows)),
            fail: false,
            ignore_threshold: false,
            full_fetches: Arc::new(AtomicUsize::new(0)),
            incremental_fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        let mut source = Self::new(CUSTOMER_COLUMNS, Vec::new());
        source.fail = true;
        source
    }
}

#[async_trait]
impl RowSource for FakeSource {
    async fn fetch_all(&self, _table: &TableConfig) -> Result<RowSet> {
        if self.fail {
            bail!("source offline");
        }
        self.full_fetches.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(RowSet::new(
            self.columns.clone(),
            self.rows.lock().unwrap().clone(),
        ))
    }

    async fn fetch_changed_since(
        &self,
        table: &TableConfig,
        threshold: &Watermark,
    ) -> Result<RowSet> {
        if self.fail {
            bail!("source offline");
        }
        self.incremental_fetches.fetch_add(1, AtomicOrdering::SeqCst);
        if self.ignore_threshold {
            return Ok(RowSet::new(
                self.columns.clone(),
                self.rows.lock().unwrap().clone(),
            ));
        }
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(&table.change_column))
            .expect("change column missing from fake source");
        let rows = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| match row[idx].as_watermark().ok().flatten() {
                Some(value) => {
                    value.partial_cmp(threshold) == Some(std::cmp::Ordering::Greater)
                }
                None => false,
            })
            .cloned()
            .collect();
        Ok(RowSet::new(self.columns.clone(), rows))
    }
}

/// What the fake sink has accumulated, keyed by rendered primary key.
#[derive(Default)]
pub struct SinkState {
    pub storage: BTreeMap<String, Vec<SqlValue>>,
    pub columns: Vec<String>,
    pub replace_calls: usize,
    pub merge_calls: usize,
}

/// Row sink that models a key-value target table.
pub struct FakeSink {
    pub state: Arc<Mutex<SinkState>>,
    pub fail_replace: bool,
    pub fail_merge: bool,
}

impl FakeSink {
    pub fn new() -> (Self, Arc<Mutex<SinkState>>) {
        let state = Arc::new(Mutex::new(SinkState::default()));
        (
            Self {
                state: Arc::clone(&state),
                fail_replace: false,
                fail_merge: false,
            },
            state,
        )
    }

    fn key(table: &TableConfig, columns: &[String], row: &[SqlValue]) -> String {
        let idx = columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(&table.primary_key))
            .expect("primary key missing from fake sink input");
        format!("{:?}", row[idx])
    }
}

#[async_trait]
impl RowSink for FakeSink {
    async fn replace_all(&mut self, table: &TableConfig, rows: &RowSet) -> Result<u64> {
        if self.fail_replace {
            bail!("sink write failed");
        }
        let mut state = self.state.lock().unwrap();
        state.storage.clear();
        state.columns = rows.columns.clone();
        for row in &rows.rows {
            let key = Self::key(table, &rows.columns, row);
            state.storage.insert(key, row.clone());
        }
        state.replace_calls += 1;
        Ok(rows.len() as u64)
    }

    async fn upsert_merge(&mut self, table: &TableConfig, rows: &RowSet) -> Result<u64> {
        if self.fail_merge {
            bail!("merge failed");
        }
        let mut state = self.state.lock().unwrap();
        state.columns = rows.columns.clone();
        for row in &rows.rows {
            let key = Self::key(table, &rows.columns, row);
            state.storage.insert(key, row.clone());
        }
        state.merge_calls += 1;
        Ok(rows.len() as u64)
    }
}

/// In-memory watermark store with injectable failures.
pub struct FakeWatermarks {
    pub state: Arc<Mutex<HashMap<String, Watermark>>>,
    pub fail_get: bool,
    pub fail_set: bool,
}

impl FakeWatermarks {
    pub fn new() -> (Self, Arc<Mutex<HashMap<String, Watermark>>>) {
        let state = Arc::new(Mutex::new(HashMap::new()));
        (
            Self {
                state: Arc::clone(&state),
                fail_get: false,
                fail_set: false,
            },
            state,
        )
    }

    pub fn with_value(table: &str, value: Watermark) -> (Self, Arc<Mutex<HashMap<String, Watermark>>>) {
        let (store, state) = Self::new();
        state.lock().unwrap().insert(table.to_string(), value);
        (store, state)
    }
}

#[async_trait]
impl WatermarkStore for FakeWatermarks {
    async fn get(&self, table_name: &str) -> Result<Option<Watermark>> {
        if self.fail_get {
            bail!("watermark store unavailable");
        }
        Ok(self.state.lock().unwrap().get(table_name).cloned())
    }

    async fn set(&mut self, table_name: &str, value: &Watermark) -> Result<()> {
        if self.fail_set {
            bail!("watermark store write failed");
        }
        self.state
            .lock()
            .unwrap()
            .insert(table_name.to_string(), value.clone());
        Ok(())
    }
}
