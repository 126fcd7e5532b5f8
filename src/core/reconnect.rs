// src/core/reconnect.rs

//! Remembers which server each player was last on, so their next join can resume there.

use crate::connection::UserConnection;
use dashmap::DashMap;

pub trait ReconnectHandler: Send + Sync {
    /// Records the server `player` is attached to as their reconnect target.
    fn set_server(&self, player: &UserConnection);
    /// The server name `player` should join, if one was remembered.
    fn server_for(&self, player: &str) -> Option<String>;
}

/// An in-memory handler; remembered servers are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryReconnectHandler {
    last_server: DashMap<String, String>,
}

impl MemoryReconnectHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReconnectHandler for MemoryReconnectHandler {
    fn set_server(&self, player: &UserConnection) {
        if let Some(server) = player.server() {
            self.last_server
                .insert(player.name().to_string(), server.info().name().to_string());
        }
    }

    fn server_for(&self, player: &str) -> Option<String> {
        self.last_server.get(player).map(|e| e.value().clone())
    }
}
