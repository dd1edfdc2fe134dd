use std::path::Path;

use anyhow::Result;

use crate::config::SyncConfig;
use crate::postgres::PgWatermarkStore;
use crate::sync::WatermarkStore;

/// Print each configured table with its stored watermark.
pub async fn run(config_path: &Path) -> Result<()> {
    let config = SyncConfig::load(config_path)?;
    let store = PgWatermarkStore::connect(&config.target).await?;
    store.ensure_table().await?;

    println!(
        "{:<24} {:<16} {:<16} {}",
        "table", "primary key", "change column", "watermark"
    );
    println!("{}", "─".repeat(90));
    for table in &config.tables {
        let watermark = store.get(&table.name).await?;
        let rendered = match watermark {
            Some(w) => w.to_string(),
            None => "(none - next run is a full load)".to_string(),
        };
        println!(
            "{:<24} {:<16} {:<16} {}",
            table.name, table.primary_key, table.change_column, rendered
        );
    }
    Ok(())
}
