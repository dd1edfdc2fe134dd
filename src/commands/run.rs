use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::config::SyncConfig;
use crate::mysql::MySqlRowSource;
use crate::postgres::{PgRowSink, PgWatermarkStore};
use crate::sync::{RunCoordinator, RunSummary, TableSyncEngine};

pub struct RunOptions {
    pub config_path: PathBuf,
    pub tables: Option<Vec<String>>,
}

/// Execute one synchronization pass over the configured tables.
pub async fn run(opts: RunOptions) -> Result<()> {
    let config = SyncConfig::load(&opts.config_path)?;
    let tables = config.select_tables(opts.tables.as_deref())?;

    let source = MySqlRowSource::connect(&config.source.url).await?;
    let sink = PgRowSink::connect(&config.target).await?;
    let watermarks = PgWatermarkStore::connect(&config.target).await?;
    watermarks.ensure_table().await?;

    let engine = TableSyncEngine::new(source, sink, watermarks);
    let mut coordinator = RunCoordinator::new(engine);
    let summary = coordinator.run(&tables).await;

    print_summary(&summary);

    if !summary.is_success() {
        bail!(
            "{} of {} tables failed to synchronize",
            summary.tables_failed(),
            summary.reports.len()
        );
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Sync run {}", summary.run_id);
    println!("{}", "═".repeat(61));
    for report in &summary.reports {
        match &report.error {
            None => {
                let mode = report
                    .mode
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  ✓ {:<24} {:<12} {} rows",
                    report.table, mode, report.rows_transferred
                );
            }
            Some(error) => {
                println!("  ✗ {:<24} failed: {}", report.table, error);
            }
        }
    }
    println!();
    println!(
        "{} succeeded, {} failed, {} rows transferred in {}ms",
        summary.tables_succeeded(),
        summary.tables_failed(),
        summary.total_rows(),
        summary.duration_ms
    );
}
