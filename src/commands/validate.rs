use std::path::Path;

use anyhow::{bail, Result};

use crate::config::SyncConfig;
use crate::preflight;

/// Validate connectivity and per-table configuration without moving data.
pub async fn run(config_path: &Path) -> Result<()> {
    let config = SyncConfig::load(config_path)?;
    let report = preflight::run_checks(&config).await?;
    report.print();
    if !report.all_passed() {
        bail!("{} pre-flight check(s) failed", report.failed_count());
    }
    Ok(())
}
