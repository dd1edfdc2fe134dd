use thiserror::Error;

/// Failure taxonomy for a single table's synchronization attempt.
///
/// Failures are table-scoped: the coordinator records them and moves on to
/// the next table. The watermark is never advanced on any of these paths.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source fetch could not complete (connectivity, query error).
    #[error("source fetch failed for table '{table}': {message}")]
    SourceUnavailable { table: String, message: String },

    /// Staging, bulk-load, or merge failed, or the commit could not be
    /// confirmed. Whatever happened, no partial success is reported upward.
    #[error("sink operation failed for table '{table}': {message}")]
    SinkFailure { table: String, message: String },

    /// The watermark store could not be read or written. Fatal to the table
    /// even if fetch and sink succeeded, since the watermark cannot be
    /// trusted to have advanced.
    #[error("watermark store failure for table '{table}': {message}")]
    WatermarkStore { table: String, message: String },

    /// The table's configuration does not match what the data looks like,
    /// e.g. a missing or non-orderable change column.
    #[error("configuration error for table '{table}': {message}")]
    Configuration { table: String, message: String },
}

impl SyncError {
    pub(crate) fn source_unavailable(table: &str, err: anyhow::Error) -> Self {
        SyncError::SourceUnavailable {
            table: table.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn sink_failure(table: &str, err: anyhow::Error) -> Self {
        SyncError::SinkFailure {
            table: table.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn watermark_store(table: &str, err: anyhow::Error) -> Self {
        SyncError::WatermarkStore {
            table: table.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn configuration(table: &str, err: anyhow::Error) -> Self {
        SyncError::Configuration {
            table: table.to_string(),
            message: format!("{err:#}"),
        }
    }

    /// Table the failure is scoped to.
    pub fn table(&self) -> &str {
        match self {
            SyncError::SourceUnavailable { table, .. }
            | SyncError::SinkFailure { table, .. }
            | SyncError::WatermarkStore { table, .. }
            | SyncError::Configuration { table, .. } => table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_table_and_cause() {
        let err = SyncError::source_unavailable("customers", anyhow::anyhow!("connection refused"));
        let text = err.to_string();
        assert!(text.contains("customers"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_error_chain_is_flattened_into_message() {
        let root = anyhow::anyhow!("timeout").context("query failed");
        let err = SyncError::sink_failure("orders", root);
        let text = err.to_string();
        assert!(text.contains("query failed"));
        assert!(text.contains("timeout"));
    }

    #[test]
    fn test_table_accessor() {
        let err = SyncError::configuration("events", anyhow::anyhow!("bad column"));
        assert_eq!(err.table(), "events");
    }
}
