// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection:
//! the pending-login step, session creation, and waiting for the session to end.

use super::guard::SessionGuard;
use super::transport::{self, PacketSink, PacketStream};
use super::user::UserConnection;
use crate::core::protocol::Packet;
use crate::core::state::ProxyState;
use crate::core::ProxyError;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How long a fresh connection may take to send its handshake.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Player names are 1..=16 characters.
const MAX_NAME_LENGTH: usize = 16;

/// Manages the full lifecycle of a client connection.
pub struct ConnectionHandler {
    reader: PacketStream,
    sink: PacketSink,
    addr: SocketAddr,
    state: Arc<ProxyState>,
    global_shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    pub fn new<T>(
        socket: T,
        addr: SocketAddr,
        state: Arc<ProxyState>,
        global_shutdown_rx: broadcast::Receiver<()>,
    ) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, sink) = transport::split(socket);
        Self {
            reader,
            sink,
            addr,
            state,
            global_shutdown_rx,
        }
    }

    /// Runs the connection until the player's session ends or the proxy shuts down.
    pub async fn run(mut self) -> Result<(), ProxyError> {
        let mut guard = SessionGuard::new(Arc::clone(&self.state), self.addr);

        let frame = match timeout(LOGIN_TIMEOUT, self.reader.next()).await {
            Ok(Some(frame)) => frame?,
            Ok(None) => {
                debug!("{} closed the connection before logging in.", self.addr);
                return Ok(());
            }
            Err(_) => {
                refuse(&self.sink, self.addr, "Took too long to log in").await;
                return Err(ProxyError::ConnectTimeout);
            }
        };

        let username = match Packet::decode(&frame)? {
            Packet::Handshake { username, .. } => username,
            other => {
                refuse(&self.sink, self.addr, "Expected a handshake").await;
                return Err(ProxyError::Protocol(format!(
                    "expected handshake, got packet {:#04x}",
                    other.tag()
                )));
            }
        };

        if username.is_empty()
            || username.chars().count() > MAX_NAME_LENGTH
            || !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            refuse(&self.sink, self.addr, "Invalid username").await;
            return Ok(());
        }
        if self.state.sessions.contains_key(&username) {
            refuse(&self.sink, self.addr, "Already connected to this proxy!").await;
            return Ok(());
        }
        let Some(target) = self.state.initial_server_for(&username) else {
            refuse(&self.sink, self.addr, "No server is available to join").await;
            return Ok(());
        };

        info!("{} logged in from {}; sending to {}", username, self.addr, target.name());
        let user = UserConnection::new(
            Arc::clone(&self.state),
            username,
            frame.freeze(),
            self.addr,
            self.reader,
            self.sink,
        );
        guard.set_session(Arc::clone(&user));

        user.connect(target).await;

        tokio::select! {
            _ = user.closed() => {}
            _ = self.global_shutdown_rx.recv() => {
                user.destroy_self("Proxy restarting").await;
            }
        }
        Ok(())
    }
}

/// Kicks a connection that never became a session.
///
/// Borrows only the sink: the handler also owns the read half, which is not `Sync`.
async fn refuse(sink: &PacketSink, addr: SocketAddr, reason: &str) {
    warn!("Refusing connection from {}: {}", addr, reason);
    match (Packet::Kick {
        reason: reason.to_string(),
    })
    .encode()
    {
        Ok(kick) => {
            if let Err(e) = sink.send(kick).await {
                debug!("Failed to send kick to {}: {}", addr, e);
            }
        }
        Err(e) => debug!("Failed to encode kick: {}", e),
    }
    sink.close().await;
}
