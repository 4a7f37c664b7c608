use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use data_pipeline::definition::{PipelineConfig, PipelineDefinition, StorageConfig};
use data_pipeline::{logging, table, Settings};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "data-pipeline")]
#[command(about = "Collect, process and store tabular data from a pipeline config")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline config once and print a JSON summary
    Run {
        /// Pipeline config file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Storage directory for configs that name none (or set PIPELINE_STORAGE_DIR)
        #[arg(short, long)]
        storage_dir: Option<PathBuf>,

        /// Include the resulting rows in the summary
        #[arg(long)]
        show_data: bool,
    },
    /// Check a pipeline config without running it
    Validate {
        /// Pipeline config file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn load_definition(path: &Path, storage_dir: &Path) -> Result<PipelineDefinition> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config: PipelineConfig =
        serde_json::from_str(&raw).with_context(|| format!("Invalid pipeline config in {}", path.display()))?;
    Ok(PipelineDefinition::from_config(config, storage_dir)?)
}

async fn run(config: PathBuf, storage_dir: PathBuf, show_data: bool) -> Result<()> {
    let definition = load_definition(&config, &storage_dir)?;
    let pipeline = definition.build()?;

    info!(
        "Running pipeline '{}' ({} collectors, {} processors)",
        pipeline.name(),
        pipeline.collector_count(),
        pipeline.processor_count()
    );
    let location = pipeline.execute().await?;

    let mut summary = json!({
        "pipeline": pipeline.name(),
        "storage_location": location,
        "status": pipeline.status(),
        "stats": pipeline.get_stats(),
        "schema": pipeline.get_schema()?,
    });
    if show_data {
        summary["data"] = serde_json::to_value(table::to_records(&pipeline.get_data()?)?)?;
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn validate(config: PathBuf, storage_dir: PathBuf) -> Result<()> {
    let definition = load_definition(&config, &storage_dir)?;
    definition.build()?;

    let storage = match &definition.storage {
        StorageConfig::Parquet { base_dir, .. } => format!("parquet in {}", base_dir.display()),
        StorageConfig::Sqlite { path } => format!("sqlite at {}", path.display()),
    };
    println!(
        "Pipeline '{}' is valid: {} collectors, {} processors, {}",
        definition.name,
        definition.collectors.len(),
        definition.processors.len(),
        storage
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env();
    logging::init(&settings.log_filter);

    let args = Args::parse();

    match args.command {
        Commands::Run {
            config,
            storage_dir,
            show_data,
        } => run(config, storage_dir.unwrap_or(settings.storage_dir), show_data).await,
        Commands::Validate { config } => validate(config, settings.storage_dir),
    }
}
