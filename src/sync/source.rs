use anyhow::Result;
use async_trait::async_trait;

use crate::config::TableConfig;
use crate::row::RowSet;
use crate::sync::watermark::Watermark;

/// Reads rows out of the operational store.
///
/// Implementations own their connection handling; the sync engine only
/// distinguishes "everything" from "changed since the watermark".
#[async_trait]
pub trait RowSource: Send {
    /// Fetch the entire source table: schema plus all rows.
    async fn fetch_all(&self, table: &TableConfig) -> Result<RowSet>;

    /// Fetch rows whose change column is strictly greater than `threshold`.
    ///
    /// Strictly greater: rows exactly equal to the watermark are assumed
    /// already synchronized and must not be re-fetched, otherwise a tie at
    /// the boundary would re-deliver forever without progressing.
    async fn fetch_changed_since(
        &self,
        table: &TableConfig,
        threshold: &Watermark,
    ) -> Result<RowSet>;
}
