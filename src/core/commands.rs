// src/core/commands.rs

//! Proxy-side chat commands.
//!
//! Chat lines that start with the configured prefix are offered to the command
//! dispatcher first. Commands the proxy does not know are passed through to the backend.

use crate::connection::UserConnection;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether a command line is handled by the proxy.
pub trait CommandDispatcher: Send + Sync {
    /// `command_line` has the prefix already stripped. Returns `true` when handled,
    /// in which case the chat packet is not forwarded to the backend.
    fn dispatch(&self, player: &Arc<UserConnection>, command_line: &str) -> bool;
}

/// A command implemented by the proxy.
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// The permission a player needs to run this command, if any.
    fn permission(&self) -> Option<&str> {
        None
    }

    fn execute(&self, player: &Arc<UserConnection>, args: &[&str]);
}

/// The default dispatcher: a case-insensitive table of registered commands.
#[derive(Default)]
pub struct CommandMap {
    commands: DashMap<String, Arc<dyn Command>>,
}

impl CommandMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map with the built-in proxy commands registered.
    pub fn with_builtins() -> Self {
        let map = Self::new();
        map.register(Arc::new(ServerCommand));
        map
    }

    pub fn register(&self, command: Arc<dyn Command>) {
        let name = command.name().to_ascii_lowercase();
        if self.commands.insert(name.clone(), command).is_some() {
            warn!("Command '{}' was registered twice; keeping the newest", name);
        }
    }

}

impl CommandDispatcher for CommandMap {
    fn dispatch(&self, player: &Arc<UserConnection>, command_line: &str) -> bool {
        let mut parts = command_line.split_whitespace();
        let Some(name) = parts.next() else {
            return false;
        };
        let Some(command) = self
            .commands
            .get(&name.to_ascii_lowercase())
            .map(|entry| Arc::clone(entry.value()))
        else {
            return false;
        };

        if let Some(permission) = command.permission()
            && !player.has_permission(permission)
        {
            debug!(
                "{} lacks permission '{}' for command '{}'",
                player.name(),
                permission,
                name
            );
            if let Err(e) = player.send_message("You do not have permission to execute this command!")
            {
                warn!("Failed to queue permission message for {}: {}", player.name(), e);
            }
            return true;
        }

        let args: Vec<&str> = parts.collect();
        command.execute(player, &args);
        true
    }
}

/// `server` lists the configured servers; `server <name>` moves the player there.
pub struct ServerCommand;

impl Command for ServerCommand {
    fn name(&self) -> &str {
        "server"
    }

    fn execute(&self, player: &Arc<UserConnection>, args: &[&str]) {
        let state = player.state();
        let reply = match args.first() {
            None => {
                let current = player
                    .server()
                    .map(|s| s.info().name().to_string())
                    .unwrap_or_default();
                let names: Vec<&str> = state.servers.keys().map(String::as_str).collect();
                format!(
                    "You are on {current}. Available servers: {}",
                    names.join(", ")
                )
            }
            Some(name) => match state.resolve_server(name) {
                Ok(target)
                    if player
                        .server()
                        .is_some_and(|s| s.info().name() == target.name()) =>
                {
                    "You are already connected to this server!".to_string()
                }
                Ok(target) => {
                    let player = Arc::clone(player);
                    tokio::spawn(async move { player.connect(target).await });
                    return;
                }
                Err(e) => e.to_string(),
            },
        };
        if let Err(e) = player.send_message(&reply) {
            warn!("Failed to queue reply for {}: {}", player.name(), e);
        }
    }
}
