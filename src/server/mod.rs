// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;

pub use context::LogReloadHandle;

/// The main proxy startup function, orchestrating all setup phases.
pub async fn run(
    config: Config,
    config_path: String,
    log_reload_handle: LogReloadHandle,
) -> Result<()> {
    // 1. Initialize proxy state, listener and background tasks.
    let server_context = initialization::setup(config, config_path, log_reload_handle).await?;

    // 2. Start the main connection acceptance loop. This function will run until shutdown.
    connection_loop::run(server_context).await
}
