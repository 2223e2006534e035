use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jobmanager::api::{AppState, build_router};
use jobmanager::cli::{Cli, Command};
use jobmanager::config::JobManagerConfig;
use jobmanager::coordinator::{ApplicationDescriptor, Placement};
use jobmanager::repository::MemoryStore;
use jobmanager::upstream::{MatchmakerClient, PolicyManagerClient, PolicyNotifier};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, listen } => {
            let mut config = match config {
                Some(path) => JobManagerConfig::load_from(&path)?,
                None => JobManagerConfig::load()?,
            };
            if let Some(listen) = listen {
                config.listen_addr = listen;
            }
            init_tracing(if cli.verbose { "debug" } else { config.log_filter.as_str() });
            serve(config).await
        }
        Command::Validate { file } => {
            init_tracing(if cli.verbose { "debug" } else { "warn" });
            validate(&file)
        }
    }
}

fn init_tracing(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn serve(config: JobManagerConfig) -> Result<()> {
    let addr = config.socket_addr()?;

    if config.matchmaker_url.is_empty() {
        warn!("MATCHMAKING_URL not set, group creation will fail");
    }
    let matchmaker = MatchmakerClient::new(config.matchmaker_url.clone(), config.http_timeout())
        .context("failed to build matchmaker client")?;
    let notifier: Option<Arc<dyn PolicyNotifier>> = if config.policy_manager_url.is_empty() {
        None
    } else {
        let client =
            PolicyManagerClient::new(config.policy_manager_url.clone(), config.http_timeout())
                .context("failed to build policy manager client")?;
        Some(Arc::new(client))
    };

    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(matchmaker),
        notifier,
        &config,
    );
    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, staleness_window_secs = config.staleness_window_secs, "job manager listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("job manager stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}

fn validate(file: &Path) -> Result<()> {
    let document =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let descriptor = ApplicationDescriptor::parse(&document)?;

    println!(
        "application {:?}: {} component(s), {} manifest(s)",
        descriptor.name,
        descriptor.components.len(),
        descriptor.manifests.len()
    );
    for component in &descriptor.components {
        let manifests = descriptor.manifests_for(component);
        let placement = match Placement::decode(&component.targets) {
            Placement::Single(target) => format!("placed on {}", target.cluster_name),
            Placement::Unset => "no placement".to_string(),
            Placement::Invalid(_) => "placement left to the matchmaker".to_string(),
        };
        println!(
            "  {}: {}/{} manifest(s) accepted, {placement}",
            component.name,
            manifests.len(),
            component.manifests.len()
        );
    }
    Ok(())
}
