//! flora-id - Plant Identification Service
//!
//! Startup: parse CLI → load config → init tracing → validate → build
//! collaborators → serve. Invalid configuration aborts before binding.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use flora_common::config::{load_toml_config, resolve_config_path};
use flora_common::logging::init_tracing;
use flora_id::config::{ServiceConfig, CONFIG_ENV_VAR, CONFIG_FILE_NAME};
use flora_id::enrichment::PlantIdClient;
use flora_id::ensemble::SourceFanout;
use flora_id::generation::GenerationChain;
use flora_id::sources::{PlantClefClient, PlantNetClient};
use flora_id::types::SourceClient;
use flora_id::validation::InMemoryRegistry;
use flora_id::{AppState, IdentificationPipeline};

/// Command-line arguments for flora-id
#[derive(Parser, Debug)]
#[command(name = "flora-id")]
#[command(about = "Multi-source plant identification service")]
#[command(version)]
struct Args {
    /// Configuration file (overrides FLORA_CONFIG and the config directories)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides [server] bind)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    let config: ServiceConfig =
        load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config.logging)?;

    info!("Starting flora-id (Plant Identification) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: built-in defaults"),
    }

    config.validate().context("Invalid configuration")?;

    let pipeline = build_pipeline(&config)?;
    let state = AppState::new(Arc::new(pipeline), config.server.max_image_bytes());
    let shutdown = state.shutdown.clone();
    let app = flora_id::build_router(state);

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Construct sources, registry, detail client and provider chain
fn build_pipeline(config: &ServiceConfig) -> Result<IdentificationPipeline> {
    let ensemble = Arc::new(config.ensemble_config()?);

    let mut sources: Vec<Arc<dyn SourceClient>> = Vec::new();

    match &config.plantclef.endpoint {
        Some(endpoint) if !endpoint.trim().is_empty() => {
            sources.push(Arc::new(PlantClefClient::new(endpoint, ensemble.source_timeout)?));
            info!(endpoint = %endpoint, "PlantCLEF source registered");
        }
        _ => warn!("PlantCLEF endpoint not configured, source disabled"),
    }

    match config.plantnet_api_key() {
        Some(api_key) => {
            sources.push(Arc::new(PlantNetClient::new(
                config.plantnet.api_url.clone(),
                api_key,
                config.plantnet.organ.clone(),
                ensemble.source_timeout,
            )?));
            info!("PlantNet source registered");
        }
        None => warn!("PlantNet API key not configured, source disabled"),
    }

    if sources.is_empty() {
        warn!("No identification source configured; every request will report no match");
    }

    let registry = Arc::new(InMemoryRegistry::load(config.registry.path.as_deref())?);
    let chain = GenerationChain::from_descriptors(&config.provider_descriptors()?)?;
    if chain.provider_names().is_empty() {
        warn!("No generation provider configured; responses use the local template");
    }

    let fanout = SourceFanout::new(sources);
    ensemble.check_registered(&fanout.source_ids())?;

    let mut pipeline = IdentificationPipeline::new(ensemble.clone(), fanout, registry, chain);

    match config.plant_id_api_key() {
        Some(api_key) => {
            let client = PlantIdClient::new(
                config.plant_id.api_url.clone(),
                api_key,
                config.plant_id.requests_per_second,
                ensemble.enrichment_timeout,
            )?;
            pipeline = pipeline.with_detail_client(Arc::new(client));
            info!("Plant.id enrichment enabled");
        }
        None => warn!("Plant.id API key not configured, enrichment disabled"),
    }

    Ok(pipeline)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
