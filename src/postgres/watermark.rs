// ABOUTME: PostgreSQL-backed watermark store - one row per table in
// ABOUTME: etl_watermark, written with an atomic upsert

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_postgres::Client;

use crate::config::TargetConfig;
use crate::sync::watermark::{Watermark, WatermarkStore};
use crate::utils::quote_ident;

const WATERMARK_TABLE: &str = "etl_watermark";

/// Durable per-table watermarks, stored next to the loaded data in the
/// warehouse so that data and watermark live in the same store.
pub struct PgWatermarkStore {
    client: Client,
    schema: String,
}

impl PgWatermarkStore {
    pub async fn connect(target: &TargetConfig) -> Result<Self> {
        let client = super::connect(&target.url).await?;
        Ok(Self {
            client,
            schema: target.schema.clone(),
        })
    }

    fn table_expr(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(WATERMARK_TABLE))
    }

    /// Create the watermark table if it does not exist yet.
    pub async fn ensure_table(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                table_name TEXT PRIMARY KEY,
                last_synced TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            self.table_expr()
        );
        self.client
            .execute(&sql, &[])
            .await
            .context("failed to create watermark table")?;
        Ok(())
    }

    /// Remove a table's watermark, forcing a full load on the next run.
    /// Returns whether a watermark existed.
    pub async fn clear(&self, table_name: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE table_name = $1", self.table_expr());
        let deleted = self
            .client
            .execute(&sql, &[&table_name])
            .await
            .with_context(|| format!("failed to clear watermark for '{}'", table_name))?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl WatermarkStore for PgWatermarkStore {
    async fn get(&self, table_name: &str) -> Result<Option<Watermark>> {
        let sql = format!(
            "SELECT last_synced FROM {} WHERE table_name = $1",
            self.table_expr()
        );
        let row = self
            .client
            .query_opt(&sql, &[&table_name])
            .await
            .with_context(|| format!("failed to read watermark for '{}'", table_name))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let text: String = row.get(0);
                let watermark = text.parse().with_context(|| {
                    format!(
                        "stored watermark '{}' for table '{}' is not parseable",
                        text, table_name
                    )
                })?;
                Ok(Some(watermark))
            }
        }
    }

    async fn set(&mut self, table_name: &str, value: &Watermark) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (table_name, last_synced, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (table_name) DO UPDATE
             SET last_synced = EXCLUDED.last_synced, updated_at = now()",
            self.table_expr()
        );
        self.client
            .execute(&sql, &[&table_name, &value.to_string()])
            .await
            .with_context(|| format!("failed to persist watermark for '{}'", table_name))?;
        Ok(())
    }
}
