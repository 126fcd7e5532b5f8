// src/core/state/core.rs

//! Defines the central `ProxyState` struct, holding all shared proxy-wide state.

use super::server_info::ServerInfo;
use crate::config::{Config, ConfigurationAdapter};
use crate::connection::{BackendConnector, TcpConnector, UserConnection};
use crate::core::commands::{CommandDispatcher, CommandMap};
use crate::core::ProxyError;
use crate::core::events::EventBus;
use crate::core::reconnect::{MemoryReconnectHandler, ReconnectHandler};
use crate::core::tablist::{GlobalTabList, TabListHandler};
use dashmap::DashMap;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::info;

/// The pluggable services a proxy runs with.
///
/// `Collaborators::defaults` wires the built-in implementations; embedders and tests
/// replace individual fields before building the state.
pub struct Collaborators {
    pub configuration: Arc<dyn ConfigurationAdapter>,
    pub commands: Arc<dyn CommandDispatcher>,
    pub tab_list: Arc<dyn TabListHandler>,
    pub reconnect: Arc<dyn ReconnectHandler>,
    pub connector: Arc<dyn BackendConnector>,
}

impl Collaborators {
    pub fn defaults(config: &Config) -> Self {
        Self {
            configuration: Arc::new(config.clone()),
            commands: Arc::new(CommandMap::with_builtins()),
            tab_list: Arc::new(GlobalTabList::new()),
            reconnect: Arc::new(MemoryReconnectHandler::new()),
            connector: Arc::new(TcpConnector::new(
                config.connect_timeout,
                config.plugin_channels.clone(),
            )),
        }
    }
}

/// The central struct holding all shared, proxy-wide state.
/// It is wrapped in an `Arc` and handed to every session, which reaches the registries
/// and collaborators through it instead of through globals.
pub struct ProxyState {
    pub config: Arc<Config>,
    /// Live sessions by player name.
    pub sessions: DashMap<String, Arc<UserConnection>>,
    /// Configured backends, in configuration order.
    pub servers: IndexMap<String, Arc<ServerInfo>>,
    pub event_bus: EventBus,
    pub configuration: Arc<dyn ConfigurationAdapter>,
    pub commands: Arc<dyn CommandDispatcher>,
    pub tab_list: Arc<dyn TabListHandler>,
    pub reconnect: Arc<dyn ReconnectHandler>,
    pub connector: Arc<dyn BackendConnector>,
}

impl std::fmt::Debug for ProxyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyState")
            .field("sessions", &self.sessions.len())
            .field("servers", &self.servers.keys().collect::<Vec<_>>())
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

impl ProxyState {
    /// Builds the proxy state with the default collaborators.
    pub fn initialize(config: Config) -> Arc<Self> {
        let collaborators = Collaborators::defaults(&config);
        Self::with_collaborators(config, collaborators)
    }

    pub fn with_collaborators(config: Config, collaborators: Collaborators) -> Arc<Self> {
        let servers: IndexMap<String, Arc<ServerInfo>> = config
            .servers
            .iter()
            .map(|(name, server)| {
                (
                    name.clone(),
                    Arc::new(ServerInfo::new(name.clone(), server.address.clone())),
                )
            })
            .collect();
        info!("Proxy state initialized with {} backend server(s).", servers.len());

        Arc::new(Self {
            config: Arc::new(config),
            sessions: DashMap::new(),
            servers,
            event_bus: EventBus::new(),
            configuration: collaborators.configuration,
            commands: collaborators.commands,
            tab_list: collaborators.tab_list,
            reconnect: collaborators.reconnect,
            connector: collaborators.connector,
        })
    }

    pub fn server(&self, name: &str) -> Option<Arc<ServerInfo>> {
        self.servers.get(name).cloned()
    }

    /// Like `server`, but an unconfigured name is an error.
    pub fn resolve_server(&self, name: &str) -> Result<Arc<ServerInfo>, ProxyError> {
        self.server(name)
            .ok_or_else(|| ProxyError::UnknownServer(name.to_string()))
    }

    pub fn session(&self, player: &str) -> Option<Arc<UserConnection>> {
        self.sessions.get(player).map(|s| Arc::clone(s.value()))
    }

    /// The server a joining player should be sent to: the one they were last on if it
    /// is still configured, otherwise the default server.
    pub fn initial_server_for(&self, player: &str) -> Option<Arc<ServerInfo>> {
        self.reconnect
            .server_for(player)
            .and_then(|name| self.server(&name))
            .or_else(|| self.server(&self.config.default_server))
    }
}
