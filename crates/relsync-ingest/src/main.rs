//! relsync - incremental release-data sync

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relsync_common::logging::{init_logging, LogConfig, LogLevel};
use relsync_common::ProjectScope;
use relsync_ingest::config::SyncConfig;
use relsync_ingest::entities;
use relsync_ingest::orchestrator::Orchestrator;
use relsync_ingest::source::DevOpsClient;
use relsync_ingest::watermark::{SqliteWatermarkStore, WatermarkStore};
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "relsync")]
#[command(author, version, about = "Incremental Azure DevOps release data sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync pass for the selected entities
    Sync {
        /// Entity to sync; repeat for several (default: all)
        #[arg(short, long = "entity")]
        entities: Vec<String>,

        /// Seconds to wait before polling ingestion outcomes
        #[arg(long, env = "RELSYNC_SETTLE_SECS")]
        settle_secs: Option<u64>,
    },

    /// List known entities and their defaults
    Entities,

    /// Show recent watermarks for an entity
    Watermarks {
        #[arg(short, long)]
        entity: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("relsync")
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Entities => {
            println!("{:<24} {:<12} {:>8}  {}", "ENTITY", "ENDPOINT", "CAP", "MAPPING");
            for descriptor in entities::catalog() {
                println!(
                    "{:<24} {:<12} {:>8}  {}",
                    descriptor.name,
                    descriptor.endpoint.path(),
                    descriptor.default_cap,
                    descriptor.mapping_name
                );
            }
            Ok(ExitCode::SUCCESS)
        },
        Command::Watermarks { entity, limit } => {
            let config = SyncConfig::from_env()?;
            let descriptor = entities::find(&entity)
                .with_context(|| format!("Unknown entity: {}", entity))?;

            let project_id = match &config.project_id {
                Some(id) => id.clone(),
                None => DevOpsClient::new(config.devops_config())?
                    .project_id(&config.project)
                    .await
                    .context("Failed to resolve project id")?,
            };
            let store = SqliteWatermarkStore::connect(
                &config.watermark_db_url,
                ProjectScope::new(&config.organization, project_id),
            )
            .await?;

            println!("{:<32} {}", "RECORDED AT", "WATERMARK");
            for mark in store.history(descriptor.name, limit).await? {
                println!("{:<32} {}", mark.recorded_at.to_rfc3339(), mark.cursor);
            }
            Ok(ExitCode::SUCCESS)
        },
        Command::Sync {
            entities,
            settle_secs,
        } => {
            let mut config = SyncConfig::from_env()?;
            if !entities.is_empty() {
                config.entities = entities;
            }
            if let Some(secs) = settle_secs {
                config.settle_secs = secs;
            }
            config.validate()?;

            info!(
                organization = %config.organization,
                project = %config.project,
                "Starting relsync"
            );
            let orchestrator = Orchestrator::from_config(&config).await?;
            let report = orchestrator.run_all().await;

            for entity in &report.entities {
                match &entity.outcome {
                    Ok(summary) => println!(
                        "{:<24} ok     records={} rows={} watermark={}",
                        entity.entity, summary.records, summary.rows, summary.watermark
                    ),
                    Err(e) => println!("{:<24} FAILED {}", entity.entity, e),
                }
            }

            if report.all_failed() {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}
