//! route-control entrypoint.
//!
//! Wires the pipeline together: filesystem provider → translator →
//! serving runner feeding the per-node snapshot cache, then waits for
//! a shutdown signal and joins every runner before exiting.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use route_control::cache::SnapshotCache;
use route_control::config::{load_config, ControlPlaneConfig};
use route_control::lifecycle::signals::shutdown_signal;
use route_control::message::{ProviderResources, TranslatedConfig};
use route_control::observability::{default_registry, logging};
use route_control::runner::{ProviderRunner, RunnerManager, ServingRunner, TranslatorRunner};

/// Control plane for declaratively configured proxy fleets.
#[derive(Debug, Parser)]
#[command(name = "route-control", version)]
struct Args {
    /// Path to the control plane configuration file.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the routing resource directory.
    #[arg(long)]
    resource_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ControlPlaneConfig::default(),
    };
    if let Some(dir) = args.resource_dir {
        config.provider.resource_dir = dir;
    }

    logging::init_logging(&config.observability.log_filter);
    tracing::info!(
        resource_dir = ?config.provider.resource_dir,
        prune_interval_secs = config.serving.prune_interval_secs,
        stale_stream_secs = config.serving.stale_stream_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        default_registry().describe();
    }

    // Shared state: the two store bundles and the snapshot cache.
    let provider_resources = ProviderResources::new();
    let translated = TranslatedConfig::new();
    let cache = Arc::new(SnapshotCache::new(config.serving.stale_after()));

    let mut manager = RunnerManager::new();
    manager.register(Box::new(ProviderRunner::new(
        config.provider.resource_dir.clone(),
        provider_resources.clone(),
    )));
    manager.register(Box::new(TranslatorRunner::new(
        provider_resources.clone(),
        translated.clone(),
    )));
    manager.register(Box::new(ServingRunner::new(
        translated.clone(),
        Arc::clone(&cache),
        config.serving.prune_interval(),
    )));

    manager.start_all();
    tracing::info!(runners = ?manager.names(), "route-control started");

    shutdown_signal().await;

    // Join every runner before the stores and the logger go away.
    manager.shutdown_all().await;
    provider_resources.close();
    translated.close();

    tracing::info!("Shutdown complete");
    Ok(())
}
