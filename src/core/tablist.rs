// src/core/tablist.rs

//! The roster (player list) seam and its default, proxy-wide implementation.

use crate::connection::UserConnection;
use dashmap::DashMap;
use tracing::trace;

/// Receives roster changes for every session.
pub trait TabListHandler: Send + Sync {
    fn on_connect(&self, player: &UserConnection);
    fn on_disconnect(&self, player: &UserConnection);
    fn on_server_change(&self, player: &UserConnection);
    fn on_ping_change(&self, player: &UserConnection, ping: i32);
    /// A backend sent a player-list entry. Returns `false` to drop it before the client sees it.
    fn on_list_update(&self, player: &UserConnection, name: &str, online: bool, ping: i16) -> bool;
}

/// Keeps one global roster of display names and their latest ping, and lets every
/// backend player-list update through.
#[derive(Debug, Default)]
pub struct GlobalTabList {
    entries: DashMap<String, i32>,
}

impl GlobalTabList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ping_of(&self, display_name: &str) -> Option<i32> {
        self.entries.get(display_name).map(|e| *e.value())
    }

    /// A snapshot of the roster, sorted by display name.
    pub fn entries(&self) -> Vec<(String, i32)> {
        let mut out: Vec<(String, i32)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort();
        out
    }
}

impl TabListHandler for GlobalTabList {
    fn on_connect(&self, player: &UserConnection) {
        self.entries.insert(player.display_name(), player.ping());
    }

    fn on_disconnect(&self, player: &UserConnection) {
        self.entries.remove(&player.display_name());
    }

    fn on_server_change(&self, player: &UserConnection) {
        trace!("{} is changing servers", player.name());
    }

    fn on_ping_change(&self, player: &UserConnection, ping: i32) {
        if let Some(mut entry) = self.entries.get_mut(&player.display_name()) {
            *entry = ping;
        }
    }

    fn on_list_update(&self, _player: &UserConnection, _name: &str, _online: bool, _ping: i16) -> bool {
        true
    }
}
