// ABOUTME: MySQL row source - full scans and change-column-threshold scans
// ABOUTME: against the operational store, via a mysql_async connection pool

use anyhow::{Context, Result};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Params, Pool, Value};

use crate::config::TableConfig;
use crate::mysql::convert::{convert_row, datetime_to_value, ColumnMeta};
use crate::row::RowSet;
use crate::sync::source::RowSource;
use crate::sync::watermark::Watermark;
use crate::utils::{quote_mysql_ident, sanitize_url};

/// Reads rows from the operational MySQL database.
pub struct MySqlRowSource {
    pool: Pool,
}

impl MySqlRowSource {
    /// Build a connection pool and verify the server is reachable.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = Pool::from_url(url)
            .with_context(|| format!("invalid MySQL URL '{}'", sanitize_url(url)))?;
        let mut conn = pool
            .get_conn()
            .await
            .with_context(|| format!("failed to connect to MySQL at '{}'", sanitize_url(url)))?;
        conn.ping().await.context("MySQL ping failed")?;
        tracing::debug!("Connected to MySQL at {}", sanitize_url(url));
        Ok(Self { pool })
    }

    /// Column names of a source table, for preflight validation.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.get_conn().await.context("failed to get MySQL connection")?;
        let columns: Vec<String> = conn
            .exec(
                "SELECT COLUMN_NAME
                 FROM INFORMATION_SCHEMA.COLUMNS
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
                 ORDER BY ORDINAL_POSITION",
                (table,),
            )
            .await
            .with_context(|| format!("failed to read column metadata for '{}'", table))?;
        Ok(columns)
    }

    /// Run a query and materialize the result as a RowSet.
    async fn query_rowset(&self, sql: &str, params: Params) -> Result<RowSet> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .context("failed to get MySQL connection")?;

        let mut result = conn
            .exec_iter(sql, params)
            .await
            .with_context(|| format!("query failed: {}", sql))?;

        let columns: Vec<ColumnMeta> = result
            .columns()
            .map(|cols| cols.iter().map(ColumnMeta::from_column).collect())
            .unwrap_or_default();

        let raw_rows: Vec<mysql_async::Row> = result
            .collect()
            .await
            .with_context(|| format!("failed to read rows for: {}", sql))?;
        drop(result);

        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let rows = raw_rows
            .into_iter()
            .map(|row| convert_row(row, &columns))
            .collect::<Result<Vec<_>>>()?;

        Ok(RowSet::new(column_names, rows))
    }
}

fn watermark_param(threshold: &Watermark) -> Value {
    match threshold {
        Watermark::Timestamp(ts) => datetime_to_value(ts),
        Watermark::Version(v) => Value::Int(*v),
    }
}

#[async_trait]
impl RowSource for MySqlRowSource {
    async fn fetch_all(&self, table: &TableConfig) -> Result<RowSet> {
        let sql = format!(
            "SELECT * FROM {}",
            quote_mysql_ident(table.source_location())
        );
        let rows = self.query_rowset(&sql, Params::Empty).await?;
        tracing::debug!(
            "Fetched {} rows from '{}' (full scan)",
            rows.len(),
            table.source_location()
        );
        Ok(rows)
    }

    async fn fetch_changed_since(
        &self,
        table: &TableConfig,
        threshold: &Watermark,
    ) -> Result<RowSet> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} > ?",
            quote_mysql_ident(table.source_location()),
            quote_mysql_ident(&table.change_column)
        );
        let params = Params::Positional(vec![watermark_param(threshold)]);
        let rows = self.query_rowset(&sql, params).await?;
        tracing::debug!(
            "Fetched {} rows from '{}' changed since {}",
            rows.len(),
            table.source_location(),
            threshold
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_watermark_param_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let value = watermark_param(&Watermark::Timestamp(ts));
        assert_eq!(value, Value::Date(2024, 1, 2, 3, 4, 5, 0));
    }

    #[test]
    fn test_watermark_param_version() {
        assert_eq!(watermark_param(&Watermark::Version(99)), Value::Int(99));
    }
}
