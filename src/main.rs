//! ringcastd - replication daemon.
//!
//! Loads a TOML config, publishes one in-memory writer per configured key,
//! serves replicas until Ctrl-C and then halts with the configured grace.

use ringcast::{Config, MemoryWriter, ReplicationServer};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        instance = config.server.instance,
        address = %config.listen.address,
        "Starting ringcastd"
    );

    let writer_keys = config.writers.clone();
    let server = ReplicationServer::new(config)?;
    for key in writer_keys {
        let index = server.publish(Arc::new(MemoryWriter::new(key)))?;
        info!(writer = %index.key, id = index.id, "Writer published");
    }

    let addr = server.start().await?;
    info!(%addr, "Accepting replicas");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    if let Some(report) = server.halt().await {
        info!(
            drained = report.agents_drained,
            forced = report.forced_connections,
            terminated = report.terminated,
            "Shutdown complete"
        );
    }
    Ok(())
}
