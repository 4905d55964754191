// src/main.rs
//! NSM Callout Forwarder
//!
//! Runs the delegate `init` verb, assembles the negotiation pipeline and
//! waits for shutdown. Startup stops at the first failure.

use anyhow::Result;
use nsm_callout_forwarder::observability::{init_metrics, init_tracing};
use nsm_callout_forwarder::pipeline::LoopbackEndpoint;
use nsm_callout_forwarder::{Forwarder, ForwarderConfig, VERSION};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let started = Instant::now();
    println!("Version [{}]", VERSION);

    // Load configuration
    let config = ForwarderConfig::load()?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;
    info!("Configuration loaded: {:?}", config);

    let downstream = Arc::new(LoopbackEndpoint::new(config.network_service.clone()));
    let forwarder = Forwarder::start(config, downstream).await?;
    info!(
        name = %forwarder.config().name,
        connect_to = %forwarder.config().connect_to,
        "Startup completed in {:?}",
        started.elapsed()
    );

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, exiting");
    forwarder.shutdown();

    Ok(())
}
