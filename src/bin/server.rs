//! HTTP server for the pipeline API

use anyhow::{Context, Result};
use clap::Parser;
use data_pipeline::api::{http, AppState};
use data_pipeline::{logging, PipelineRegistry, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Serve the data pipeline HTTP API")]
#[command(version)]
struct Args {
    /// Address to listen on (or set PIPELINE_BIND_ADDR)
    #[arg(short, long)]
    bind: Option<String>,

    /// Default Parquet storage directory (or set PIPELINE_STORAGE_DIR)
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Route prefix for pipeline endpoints (or set PIPELINE_API_PREFIX)
    #[arg(long)]
    api_prefix: Option<String>,

    /// Log filter, e.g. "debug" (RUST_LOG takes precedence)
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::from_env();
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }
    if let Some(dir) = args.storage_dir {
        settings.storage_dir = dir;
    }
    if let Some(prefix) = args.api_prefix {
        settings.api_prefix = match prefix.trim_matches('/') {
            "" => String::new(),
            trimmed => format!("/{}", trimmed),
        };
    }
    if let Some(filter) = args.log {
        settings.log_filter = filter;
    }

    logging::init(&settings.log_filter);
    info!("Starting {}...", settings.project_name);

    let registry = Arc::new(PipelineRegistry::new(settings.storage_dir.clone()));
    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    info!(
        "Listening on http://{} (pipelines under {}, storage in {})",
        settings.bind_addr,
        settings.api_prefix,
        settings.storage_dir.display()
    );

    let state = Arc::new(AppState::new(registry, settings));
    http::serve(listener, state).await.context("Server stopped")?;
    Ok(())
}
