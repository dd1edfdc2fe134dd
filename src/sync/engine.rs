// ABOUTME: TableSyncEngine - decides full vs incremental load per table,
// ABOUTME: drives source -> sink, and advances the watermark after commit

use anyhow::anyhow;

use crate::config::TableConfig;
use crate::error::SyncError;
use crate::row::RowSet;
use crate::sync::sink::RowSink;
use crate::sync::source::RowSource;
use crate::sync::watermark::{Watermark, WatermarkStore};

/// How a table was synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Incremental,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Full => write!(f, "full"),
            SyncMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Result of one successful table synchronization.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub mode: SyncMode,
    pub rows_transferred: u64,
    /// Watermark in effect after the run; `None` means the table has never
    /// anchored one (empty first load, or all-NULL change column).
    pub watermark: Option<Watermark>,
}

/// Synchronizes one table per call: reads the watermark, branches between
/// full reload and incremental merge, and advances the watermark only after
/// the sink confirms the corresponding rows committed.
///
/// The engine holds its collaborators by value (dependency injection, no
/// ambient connection state), so tests drive it with in-memory
/// implementations of the three traits.
pub struct TableSyncEngine<S, K, W> {
    source: S,
    sink: K,
    watermarks: W,
}

impl<S, K, W> TableSyncEngine<S, K, W>
where
    S: RowSource,
    K: RowSink,
    W: WatermarkStore,
{
    pub fn new(source: S, sink: K, watermarks: W) -> Self {
        Self {
            source,
            sink,
            watermarks,
        }
    }

    /// Synchronize a single table.
    ///
    /// Any failure aborts this table without touching the watermark; the
    /// next run re-fetches an overlapping range and the sink's merge makes
    /// the re-delivery idempotent.
    pub async fn synchronize(&mut self, table: &TableConfig) -> Result<SyncOutcome, SyncError> {
        let current = self
            .watermarks
            .get(&table.name)
            .await
            .map_err(|e| SyncError::watermark_store(&table.name, e))?;

        match current {
            None => self.full_load(table).await,
            Some(watermark) => self.incremental_load(table, watermark).await,
        }
    }

    async fn full_load(&mut self, table: &TableConfig) -> Result<SyncOutcome, SyncError> {
        tracing::info!(
            "No watermark for table '{}', performing full load from '{}'",
            table.name,
            table.source_location()
        );

        let rows = self
            .source
            .fetch_all(table)
            .await
            .map_err(|e| SyncError::source_unavailable(&table.name, e))?;

        if rows.is_empty() {
            tracing::info!("Source table '{}' is empty, nothing to load", table.name);
            return Ok(SyncOutcome {
                mode: SyncMode::Full,
                rows_transferred: 0,
                watermark: None,
            });
        }

        self.check_alignment(table, &rows, false)?;

        let transferred = self
            .sink
            .replace_all(table, &rows)
            .await
            .map_err(|e| SyncError::sink_failure(&table.name, e))?;

        // Only now that the sink has confirmed the commit may the watermark
        // be anchored.
        let max = rows
            .max_change_value(&table.change_column)
            .map_err(|e| SyncError::configuration(&table.name, e))?;

        let watermark = match max {
            Some(value) => {
                self.watermarks
                    .set(&table.name, &value)
                    .await
                    .map_err(|e| SyncError::watermark_store(&table.name, e))?;
                tracing::info!(
                    "Full load of '{}' complete: {} rows, watermark set to {}",
                    table.name,
                    transferred,
                    value
                );
                Some(value)
            }
            None => {
                // Known degenerate case: with no non-NULL change values
                // there is nothing to anchor a watermark to, and every
                // subsequent run will repeat the full load.
                tracing::warn!(
                    "Every row of '{}' has a NULL change column '{}'; watermark left unset, \
                     subsequent runs will repeat the full load",
                    table.name,
                    table.change_column
                );
                None
            }
        };

        Ok(SyncOutcome {
            mode: SyncMode::Full,
            rows_transferred: transferred,
            watermark,
        })
    }

    async fn incremental_load(
        &mut self,
        table: &TableConfig,
        since: Watermark,
    ) -> Result<SyncOutcome, SyncError> {
        let rows = self
            .source
            .fetch_changed_since(table, &since)
            .await
            .map_err(|e| SyncError::source_unavailable(&table.name, e))?;

        if rows.is_empty() {
            tracing::debug!(
                "No changes in '{}' since watermark {}",
                table.name,
                since
            );
            return Ok(SyncOutcome {
                mode: SyncMode::Incremental,
                rows_transferred: 0,
                watermark: Some(since),
            });
        }

        self.check_alignment(table, &rows, true)?;

        let transferred = self
            .sink
            .upsert_merge(table, &rows)
            .await
            .map_err(|e| SyncError::sink_failure(&table.name, e))?;

        let max = rows
            .max_change_value(&table.change_column)
            .map_err(|e| SyncError::configuration(&table.name, e))?;

        let next = match max {
            Some(candidate) if candidate > since => {
                self.watermarks
                    .set(&table.name, &candidate)
                    .await
                    .map_err(|e| SyncError::watermark_store(&table.name, e))?;
                tracing::info!(
                    "Incremental load of '{}' complete: {} rows, watermark {} -> {}",
                    table.name,
                    transferred,
                    since,
                    candidate
                );
                candidate
            }
            Some(candidate) => {
                // The watermark never regresses. A fetched maximum at or
                // below the stored watermark (or of a different kind) means
                // the change column is not monotonic, which is a
                // configuration problem, not a reason to lose ground.
                tracing::warn!(
                    "Change column '{}' of '{}' is not monotonic: fetched maximum {} does not \
                     advance past stored watermark {}; keeping {}",
                    table.change_column,
                    table.name,
                    candidate,
                    since,
                    since
                );
                since
            }
            None => {
                tracing::warn!(
                    "All {} fetched rows of '{}' have a NULL change column '{}'; keeping \
                     watermark {}",
                    transferred,
                    table.name,
                    table.change_column,
                    since
                );
                since
            }
        };

        Ok(SyncOutcome {
            mode: SyncMode::Incremental,
            rows_transferred: transferred,
            watermark: Some(next),
        })
    }

    /// Validate the fetched schema before handing rows to the sink: row
    /// arity must match the column list, the change column must be present,
    /// and for merges the primary key must be present too.
    fn check_alignment(
        &self,
        table: &TableConfig,
        rows: &RowSet,
        needs_primary_key: bool,
    ) -> Result<(), SyncError> {
        rows.validate()
            .map_err(|e| SyncError::configuration(&table.name, e))?;

        if rows.column_index(&table.change_column).is_none() {
            return Err(SyncError::configuration(
                &table.name,
                anyhow!(
                    "change column '{}' not present in fetched columns [{}]",
                    table.change_column,
                    rows.columns.join(", ")
                ),
            ));
        }

        if needs_primary_key && rows.column_index(&table.primary_key).is_none() {
            return Err(SyncError::configuration(
                &table.name,
                anyhow!(
                    "primary key '{}' not present in fetched columns [{}]",
                    table.primary_key,
                    rows.columns.join(", ")
                ),
            ));
        }

        Ok(())
    }
}
