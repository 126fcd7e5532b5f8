// src/core/state/server_info.rs

//! Defines `ServerInfo`, the proxy's shared record of one configured backend server.

use crate::core::ProxyError;
use crate::core::protocol::Packet;
use crate::core::queue::PacketQueue;
use bytes::Bytes;
use dashmap::DashSet;
use tracing::trace;

/// One configured backend, shared by every session that attaches to it.
#[derive(Debug)]
pub struct ServerInfo {
    name: String,
    address: String,
    /// Names of players currently attached to this server.
    players: DashSet<String>,
    /// Plugin messages waiting for the next upstream drain of any attached session.
    pending: PacketQueue,
}

impl ServerInfo {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            players: DashSet::new(),
            pending: PacketQueue::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn add_player(&self, player: &str) {
        self.players.insert(player.to_string());
    }

    /// Returns true if the player was on this server's roster.
    pub fn remove_player(&self, player: &str) -> bool {
        self.players.remove(player).is_some()
    }

    pub fn has_player(&self, player: &str) -> bool {
        self.players.contains(player)
    }

    /// A snapshot of attached players, sorted by name.
    pub fn players(&self) -> Vec<String> {
        let mut players: Vec<String> = self.players.iter().map(|p| p.key().clone()).collect();
        players.sort();
        players
    }

    /// Queues a plugin message for delivery to this server.
    ///
    /// The message is written by whichever attached session relays a packet upstream
    /// next. With no attached players it waits until one arrives.
    pub fn send_data(&self, channel: &str, data: Bytes) -> Result<(), ProxyError> {
        let packet = Packet::PluginMessage {
            channel: channel.to_string(),
            data,
        }
        .encode()?;
        trace!("Queued plugin message on '{}' for server {}", channel, self.name);
        self.pending.push(packet);
        Ok(())
    }

    /// Takes every pending plugin message, in the order they were queued.
    pub fn take_pending(&self) -> Vec<Bytes> {
        self.pending.drain()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
