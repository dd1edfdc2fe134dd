// ABOUTME: Pre-flight validation checks for sync prerequisites
// ABOUTME: Verifies connectivity and per-table column configuration

use anyhow::Result;

use crate::config::SyncConfig;
use crate::mysql::MySqlRowSource;
use crate::postgres::PgWatermarkStore;

/// Individual check result.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
        }
    }
}

/// Complete pre-flight results.
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    pub fn print(&self) {
        println!();
        println!("Pre-flight Checks");
        println!("{}", "═".repeat(61));
        for check in &self.checks {
            let icon = if check.passed { "✓" } else { "✗" };
            println!("  {} {}", icon, check.message);
        }
        println!();
        if self.all_passed() {
            println!("All checks passed.");
        } else {
            println!("{} check(s) failed.", self.failed_count());
        }
    }

    fn push(&mut self, check: CheckResult) {
        self.checks.push(check);
    }
}

/// Run every check against the given configuration.
pub async fn run_checks(config: &SyncConfig) -> Result<PreflightReport> {
    let mut report = PreflightReport::default();

    // Source connectivity, then per-table column configuration.
    match MySqlRowSource::connect(&config.source.url).await {
        Ok(source) => {
            report.push(CheckResult::pass("source", "Source database is reachable"));
            for table in &config.tables {
                check_source_table(&source, table, &mut report).await;
            }
        }
        Err(e) => {
            report.push(CheckResult::fail(
                "source",
                format!("Cannot connect to source database: {e:#}"),
            ));
        }
    }

    // Target connectivity and target tables.
    match crate::postgres::connect(&config.target.url).await {
        Ok(client) => {
            report.push(CheckResult::pass("target", "Target database is reachable"));
            for table in &config.tables {
                check_target_table(&client, &config.target.schema, table, &mut report).await;
            }
        }
        Err(e) => {
            report.push(CheckResult::fail(
                "target",
                format!("Cannot connect to target database: {e:#}"),
            ));
        }
    }

    // Watermark store.
    match PgWatermarkStore::connect(&config.target).await {
        Ok(store) => match store.ensure_table().await {
            Ok(()) => report.push(CheckResult::pass(
                "watermarks",
                "Watermark table is ready",
            )),
            Err(e) => report.push(CheckResult::fail(
                "watermarks",
                format!("Cannot create watermark table: {e:#}"),
            )),
        },
        Err(e) => {
            report.push(CheckResult::fail(
                "watermarks",
                format!("Cannot connect to watermark store: {e:#}"),
            ));
        }
    }

    Ok(report)
}

async fn check_source_table(
    source: &MySqlRowSource,
    table: &crate::config::TableConfig,
    report: &mut PreflightReport,
) {
    let check_name = format!("source:{}", table.name);
    let columns = match source.table_columns(table.source_location()).await {
        Ok(columns) => columns,
        Err(e) => {
            report.push(CheckResult::fail(
                check_name,
                format!("Cannot read columns of '{}': {e:#}", table.source_location()),
            ));
            return;
        }
    };

    if columns.is_empty() {
        report.push(CheckResult::fail(
            check_name,
            format!("Source table '{}' does not exist", table.source_location()),
        ));
        return;
    }

    let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));
    if !has(&table.change_column) {
        report.push(CheckResult::fail(
            check_name,
            format!(
                "Source table '{}' has no change column '{}'",
                table.source_location(),
                table.change_column
            ),
        ));
    } else if !has(&table.primary_key) {
        report.push(CheckResult::fail(
            check_name,
            format!(
                "Source table '{}' has no primary key column '{}'",
                table.source_location(),
                table.primary_key
            ),
        ));
    } else {
        report.push(CheckResult::pass(
            check_name,
            format!(
                "Source table '{}' has '{}' and '{}'",
                table.source_location(),
                table.primary_key,
                table.change_column
            ),
        ));
    }
}

async fn check_target_table(
    client: &tokio_postgres::Client,
    schema: &str,
    table: &crate::config::TableConfig,
    report: &mut PreflightReport,
) {
    let check_name = format!("target:{}", table.name);
    let result = client
        .query_one(
            "SELECT COUNT(*) FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2",
            &[&schema, &table.target_location()],
        )
        .await;

    match result {
        Ok(row) => {
            let count: i64 = row.get(0);
            if count > 0 {
                report.push(CheckResult::pass(
                    check_name,
                    format!(
                        "Target table '{}.{}' exists",
                        schema,
                        table.target_location()
                    ),
                ));
            } else {
                report.push(CheckResult::fail(
                    check_name,
                    format!(
                        "Target table '{}.{}' does not exist (create it before syncing)",
                        schema,
                        table.target_location()
                    ),
                ));
            }
        }
        Err(e) => {
            report.push(CheckResult::fail(
                check_name,
                format!("Cannot inspect target table: {e}"),
            ));
        }
    }
}
