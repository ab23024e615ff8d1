//! View server CLI

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fog_view_server::{
    init_prometheus_recorder, MemoryMissedRanges, MemoryRngDirectory, MemoryTxOutIndex,
    ServerBuilder, ServerConfig, SeedFile,
};

#[derive(Parser, Debug)]
#[command(name = "fog-view-server")]
#[command(about = "Incremental balance-discovery query server", long_about = None)]
struct Args {
    /// JSON config file; defaults apply to anything it omits
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the config file
    #[arg(long)]
    bind: Option<String>,

    /// JSON seed file for the in-memory stores
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Serve Prometheus metrics at /metrics
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    config.enable_metrics |= args.metrics;

    let directory = Arc::new(MemoryRngDirectory::new());
    let missed = Arc::new(MemoryMissedRanges::new());
    let index = Arc::new(MemoryTxOutIndex::new());

    if let Some(path) = &args.seed {
        let seed = SeedFile::load(path)
            .with_context(|| format!("loading seed {}", path.display()))?;
        seed.apply(&directory, &missed, &index)?;
    }

    let mut builder = ServerBuilder::new(config.clone())
        .directory(directory)
        .missed_ranges(missed)
        .index(index);

    if config.enable_metrics {
        match init_prometheus_recorder() {
            Some(handle) => builder = builder.metrics(handle),
            None => tracing::warn!("Metrics recorder already installed, /metrics disabled"),
        }
    }

    builder.build()?.serve().await?;

    Ok(())
}
