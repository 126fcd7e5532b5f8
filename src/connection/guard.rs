// src/connection/guard.rs

//! Defines `SessionGuard`, an RAII guard for per-connection resource management.

use super::user::UserConnection;
use crate::core::metrics;
use crate::core::state::ProxyState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// An RAII guard to ensure connection resources are always released when a
/// connection task's scope is exited, including by panic or cancellation.
pub struct SessionGuard {
    state: Arc<ProxyState>,
    addr: SocketAddr,
    /// Set once the login step has produced a session.
    session: Option<Arc<UserConnection>>,
}

impl SessionGuard {
    /// Creates a guard for an accepted connection and counts it as connected.
    pub fn new(state: Arc<ProxyState>, addr: SocketAddr) -> Self {
        metrics::CONNECTED_PLAYERS.inc();
        Self {
            state,
            addr,
            session: None,
        }
    }

    pub fn set_session(&mut self, session: Arc<UserConnection>) {
        self.session = Some(session);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_PLAYERS.dec();
        let Some(session) = self.session.take() else {
            debug!("Connection {} closed before login completed.", self.addr);
            return;
        };

        // `destroy_self` normally unregisters the session already; this covers tasks
        // that were aborted before it could run.
        let removed = self
            .state
            .sessions
            .remove_if(session.name(), |_, registered| Arc::ptr_eq(registered, &session));
        if removed.is_some() {
            debug!(
                "SessionGuard removed lingering registry entry for {} ({}).",
                session.name(),
                self.addr
            );
        }
        // A newer session for the same player owns the roster entries from here on.
        if self.state.session(session.name()).is_none() {
            for server in self.state.servers.values() {
                server.remove_player(session.name());
            }
        }
    }
}
