// src/server/initialization.rs

//! Handles proxy initialization: building the shared state, binding the listener,
//! and spawning background tasks.

use super::context::{LogReloadHandle, ServerContext};
use super::metrics_server;
use crate::config::Config;
use crate::core::state::ProxyState;
use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all proxy components before starting the main loop.
pub async fn setup(
    config: Config,
    config_path: String,
    log_reload_handle: LogReloadHandle,
) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("mcrelay listening on {}:{}", config.host, config.port);
    let connection_permits = Arc::new(Semaphore::new(config.max_players));

    let state = ProxyState::initialize(config);

    let mut background_tasks = JoinSet::new();
    if state.config.metrics.enabled {
        let metrics_state = state.clone();
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx_metrics).await
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
        background_tasks,
        connection_permits,
        log_reload_handle,
        config_path,
    })
}

fn log_startup_info(config: &Config) {
    info!("Starting mcrelay v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Max players: {}, connect timeout: {:?}, default server: {}",
        config.max_players, config.connect_timeout, config.default_server
    );
    for (name, server) in &config.servers {
        info!("Backend '{}' at {}", name, server.address);
    }
}
