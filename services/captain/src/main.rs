//! Captain
//!
//! Captain fronts a fleet of container nodes with a single HTTP API. It
//! places application instances onto nodes, tracks slot capacity, and
//! collects expired containers as it sweeps.

use anyhow::Result;
use captain_server::{config::Config, discovery, orchestrator::Orchestrator, state::AppState};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to CAPTAIN_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting captain");
    info!(listen_addr = %config.listen_addr, "Configuration loaded");

    // Resolve node endpoints and build the pool once, up front
    let resolver = discovery::resolver_from_config(&config)?;
    let orchestrator = match Orchestrator::from_resolver(resolver.as_ref(), &config).await {
        Ok(orchestrator) => {
            info!(nodes = orchestrator.node_ids().len(), "Node pool established");
            orchestrator
        }
        Err(e) => {
            error!(error = %e, "Failed to build node pool");
            return Err(e.into());
        }
    };

    // Create application state
    let state = AppState::new(orchestrator);

    // Build and run the server
    let app = captain_server::api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn the server with graceful shutdown
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");

            // Let in-flight requests drain before exiting
            let _ = shutdown_tx.send(true);
            let shutdown_timeout = std::time::Duration::from_secs(10);
            if let Err(e) = tokio::time::timeout(shutdown_timeout, server_handle).await {
                warn!(error = %e, "Server did not shut down in time");
            }
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    info!("Captain shutdown complete");
    Ok(())
}
