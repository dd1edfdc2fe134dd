// ABOUTME: CLI entry point for warehouse-replicator
// ABOUTME: Parses commands and routes to appropriate handlers

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use warehouse_replicator::commands;

#[derive(Parser)]
#[command(name = "warehouse-replicator")]
#[command(about = "MySQL-to-PostgreSQL warehouse loader", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one synchronization pass over the configured tables
    Run {
        /// Path to the sync configuration file
        #[arg(long)]
        config: PathBuf,
        /// Sync only these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
    },
    /// Show each configured table with its stored watermark
    Status {
        #[arg(long)]
        config: PathBuf,
    },
    /// Check connectivity and per-table configuration without moving data
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Inspect or repair per-table watermarks
    Watermark {
        #[command(subcommand)]
        action: WatermarkAction,
    },
}

#[derive(Subcommand)]
enum WatermarkAction {
    /// Print the stored watermark for a table
    Get {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        table: String,
    },
    /// Overwrite the stored watermark for a table
    Set {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        table: String,
        /// New watermark value (timestamp or integer version)
        value: String,
    },
    /// Remove the stored watermark, forcing a full reload on the next run
    Clear {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        table: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG has the highest precedence, then --log, then "info".
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Run { config, tables } => {
            commands::run::run(commands::run::RunOptions {
                config_path: config,
                tables,
            })
            .await
        }
        Commands::Status { config } => commands::status::run(&config).await,
        Commands::Validate { config } => commands::validate::run(&config).await,
        Commands::Watermark { action } => match action {
            WatermarkAction::Get { config, table } => {
                commands::watermark::get(&config, &table).await
            }
            WatermarkAction::Set {
                config,
                table,
                value,
            } => commands::watermark::set(&config, &table, &value).await,
            WatermarkAction::Clear { config, table } => {
                commands::watermark::clear(&config, &table).await
            }
        },
    }
}
