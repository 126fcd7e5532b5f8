// src/server/context.rs

use crate::core::state::ProxyState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing_subscriber::{filter::EnvFilter, reload};

pub type LogReloadHandle = Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>;

/// Holds all the initialized state required to run the proxy's main loop.
pub struct ServerContext {
    pub state: Arc<ProxyState>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    /// One permit per player slot.
    pub connection_permits: Arc<Semaphore>,
    pub log_reload_handle: LogReloadHandle,
    /// Where the configuration was loaded from; re-read on SIGHUP.
    pub config_path: String,
}
