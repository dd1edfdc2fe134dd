use std::path::Path;

use anyhow::{bail, Result};

use crate::config::SyncConfig;
use crate::postgres::PgWatermarkStore;
use crate::sync::{Watermark, WatermarkStore};

async fn open_store(config_path: &Path, table: &str) -> Result<PgWatermarkStore> {
    let config = SyncConfig::load(config_path)?;
    if !config.tables.iter().any(|t| t.name == table) {
        bail!("table '{}' is not present in the configuration", table);
    }
    let store = PgWatermarkStore::connect(&config.target).await?;
    store.ensure_table().await?;
    Ok(store)
}

/// Print the stored watermark for one table.
pub async fn get(config_path: &Path, table: &str) -> Result<()> {
    let store = open_store(config_path, table).await?;
    match store.get(table).await? {
        Some(watermark) => println!("{}", watermark),
        None => println!("No watermark set for '{}' (next run is a full load)", table),
    }
    Ok(())
}

/// Overwrite the stored watermark for one table. The next incremental run
/// fetches rows strictly after this value.
pub async fn set(config_path: &Path, table: &str, value: &str) -> Result<()> {
    let watermark: Watermark = value.parse()?;
    let mut store = open_store(config_path, table).await?;
    store.set(table, &watermark).await?;
    println!("Watermark for '{}' set to {}", table, watermark);
    Ok(())
}

/// Remove the stored watermark for one table, forcing a full reload.
pub async fn clear(config_path: &Path, table: &str) -> Result<()> {
    let store = open_store(config_path, table).await?;
    if store.clear(table).await? {
        println!(
            "Watermark for '{}' cleared; the next run performs a full load",
            table
        );
    } else {
        println!("No watermark was set for '{}'", table);
    }
    Ok(())
}
