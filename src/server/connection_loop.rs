// src/server/connection_loop.rs

//! Contains the main proxy loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::config::Config;
use crate::connection::ConnectionHandler;
use crate::core::metrics;
use anyhow::{Result, anyhow};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::filter::EnvFilter;

/// The main proxy loop that accepts connections and handles graceful shutdown.
pub async fn run(mut ctx: ServerContext) -> Result<()> {
    let mut client_tasks = JoinSet::new();

    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow!("Failed to register SIGHUP handler: {}", e))?;

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }
            _ = sighup.recv() => {
                reload_log_level(&ctx);
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
                        let Ok(permit) = ctx.connection_permits.clone().try_acquire_owned() else {
                            warn!("Rejecting connection from {}: proxy is full.", addr);
                            drop(socket);
                            continue;
                        };
                        info!("Accepted new connection from: {}", addr);
                        if let Err(e) = socket.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }

                        let handler = ConnectionHandler::new(
                            socket,
                            addr,
                            ctx.state.clone(),
                            ctx.shutdown_tx.subscribe(),
                        );
                        client_tasks.spawn(async move {
                            let _permit = permit;
                            if let Err(e) = handler.run().await {
                                warn!("Connection from {} terminated unexpectedly: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        warn!("No tasks were listening for the shutdown signal.");
    }

    // Sessions kick their players on the shutdown signal; give them a moment to do so.
    if tokio::time::timeout(Duration::from_secs(5), async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for player sessions to close; aborting the rest.");
        client_tasks.shutdown().await;
    }
    info!("All client connections closed.");

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Proxy shutdown complete.");
    Ok(())
}

/// Re-reads `log_level` from the configuration file and applies it without a restart.
fn reload_log_level(ctx: &ServerContext) {
    let config = match Config::from_file(&ctx.config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!("SIGHUP: keeping current log level, config reload failed: {:#}", e);
            return;
        }
    };
    match ctx
        .log_reload_handle
        .modify(|filter| *filter = EnvFilter::new(&config.log_level))
    {
        Ok(()) => info!("SIGHUP: log level set to '{}'.", config.log_level),
        Err(e) => error!("SIGHUP: failed to apply log level: {}", e),
    }
}
