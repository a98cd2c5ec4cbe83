//! Beacon Agent - heartbeat daemon entry point
//!
//! Runs until interrupted; the host's process manager restarts it on crash.

use beacon_agent::state::{AgentConfig, AgentState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting beacon agent v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::default();
    tracing::info!(
        base_dir = %config.base_dir.display(),
        directory_url = %config.directory_url,
        collector_url = %config.collector_url,
        probe_cameras = config.probe_cameras,
        "Configuration loaded"
    );

    let state = AgentState::build(config).await?;
    tracing::info!(site_id = %state.site.site_id, "Site identity loaded");

    let queued = state.store.load().await;
    if !queued.is_empty() {
        tracing::info!(
            entities = queued.entity_count(),
            slots = queued.slot_count(),
            "Delayed slots pending from previous run"
        );
    }

    let handles = Arc::new(state.scheduler()).start().await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    for handle in handles {
        handle.abort();
    }

    Ok(())
}
