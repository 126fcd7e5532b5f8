// src/core/events.rs

//! Defines the event bus that lets listeners observe, alter, or cancel traffic
//! flowing through a player session.

use crate::core::state::ServerInfo;
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

/// Which side of the proxy a relayed message came from or is going to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A player, by name.
    Player(String),
    /// A backend server, by configured name.
    Server(String),
}

#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub sender: Endpoint,
    pub receiver: Endpoint,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PluginMessageEvent {
    pub sender: Endpoint,
    pub receiver: Endpoint,
    pub tag: String,
    pub data: Bytes,
}

/// Fired before a player is moved to another server. Listeners may replace `target`.
#[derive(Debug, Clone)]
pub struct ServerConnectEvent {
    pub player: String,
    pub target: Arc<ServerInfo>,
}

#[derive(Debug, Clone)]
pub enum ProxyEvent {
    Chat(ChatEvent),
    PluginMessage(PluginMessageEvent),
    ServerConnect(ServerConnectEvent),
}

impl ProxyEvent {
    fn kind(&self) -> &'static str {
        match self {
            ProxyEvent::Chat(_) => "chat",
            ProxyEvent::PluginMessage(_) => "plugin_message",
            ProxyEvent::ServerConnect(_) => "server_connect",
        }
    }
}

/// A subscriber to proxy events.
pub trait Listener: Send + Sync {
    /// Handles an event, possibly mutating it. Returning `true` cancels it.
    fn on_event(&self, event: &mut ProxyEvent) -> bool;
}

/// The proxy-wide event dispatcher.
///
/// Every registered listener sees every event in registration order, even after an
/// earlier listener has cancelled it. The event is cancelled if any listener asked for it.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn Listener>) {
        self.listeners.write().push(listener);
    }

    /// Dispatches `event` to all listeners and reports whether it was cancelled.
    pub fn fire(&self, event: &mut ProxyEvent) -> bool {
        // Snapshot so listeners may register others without deadlocking.
        let listeners: Vec<Arc<dyn Listener>> = self.listeners.read().clone();
        let mut cancelled = false;
        for listener in listeners {
            cancelled |= listener.on_event(event);
        }
        if cancelled {
            trace!("{} event cancelled by a listener", event.kind());
        }
        cancelled
    }
}
