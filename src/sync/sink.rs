use anyhow::Result;
use async_trait::async_trait;

use crate::config::TableConfig;
use crate::row::RowSet;

/// Applies fetched rows to the warehouse.
///
/// Both operations must be all-or-nothing from the caller's point of view:
/// returning `Ok` means every row is durably committed, and returning `Err`
/// means the target still holds its previous contents. The returned count is
/// the number of rows the target confirmed applied.
#[async_trait]
pub trait RowSink: Send {
    /// Replace the target table's entire contents with `rows`.
    ///
    /// A concurrent reader may see the old contents or the new contents but
    /// never a mixture, within whatever isolation the target store provides.
    async fn replace_all(&mut self, table: &TableConfig, rows: &RowSet) -> Result<u64>;

    /// Merge `rows` into the target keyed on the table's primary key:
    /// matched keys have every non-key column overwritten, unmatched keys
    /// are inserted, and target rows absent from `rows` are left untouched.
    ///
    /// Re-running the same merge must be a no-op for unchanged keys, so a
    /// crashed run can safely re-deliver an overlapping batch.
    async fn upsert_merge(&mut self, table: &TableConfig, rows: &RowSet) -> Result<u64>;
}
