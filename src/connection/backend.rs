// src/connection/backend.rs

//! Backend attachments: one live connection from the proxy to a server on behalf of
//! a single player, and the connector that opens them.

use super::transport::{self, PacketSink, PacketStream};
use crate::core::ProxyError;
use crate::core::protocol::packet::ids;
use crate::core::protocol::plugin_channel::{REGISTER_CHANNEL, register_payload};
use crate::core::protocol::{LoginParams, Packet};
use crate::core::queue::PacketQueue;
use crate::core::state::ServerInfo;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace};

/// A player's attachment to one backend server.
///
/// Created on every successful connect and discarded when the player switches away
/// or the session ends.
pub struct ServerConnection {
    info: Arc<ServerInfo>,
    login: LoginParams,
    sink: PacketSink,
    /// Taken by the downstream pump that relays this attachment.
    reader: Mutex<Option<PacketStream>>,
    /// Packets injected by the proxy, written ahead of the next upstream packet.
    queue: PacketQueue,
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("server", &self.info.name())
            .field("entity_id", &self.login.entity_id)
            .field("sink", &self.sink)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl ServerConnection {
    /// Wraps an already logged-in backend stream.
    pub fn new<T>(info: Arc<ServerInfo>, login: LoginParams, io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, sink) = transport::split(io);
        Self::from_parts(info, login, reader, sink)
    }

    pub fn from_parts(
        info: Arc<ServerInfo>,
        login: LoginParams,
        reader: PacketStream,
        sink: PacketSink,
    ) -> Self {
        Self {
            info,
            login,
            sink,
            reader: Mutex::new(Some(reader)),
            queue: PacketQueue::new(),
        }
    }

    pub fn info(&self) -> &Arc<ServerInfo> {
        &self.info
    }

    /// The world parameters the backend sent when the player attached.
    pub fn login(&self) -> &LoginParams {
        &self.login
    }

    pub fn sink(&self) -> &PacketSink {
        &self.sink
    }

    pub fn queue(&self) -> &PacketQueue {
        &self.queue
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_open()
    }

    pub(crate) fn take_reader(&self) -> Option<PacketStream> {
        self.reader.lock().take()
    }

    pub(crate) fn restore_reader(&self, reader: PacketStream) {
        *self.reader.lock() = Some(reader);
    }

    /// Sends the backend a kick with `reason` and closes the connection.
    pub async fn disconnect(&self, reason: &str) {
        if !self.sink.is_open() {
            return;
        }
        match (Packet::Kick {
            reason: reason.to_string(),
        })
        .encode()
        {
            Ok(kick) => {
                if let Err(e) = self.sink.send(kick).await {
                    debug!("Failed to send kick to {}: {}", self.info.name(), e);
                }
            }
            Err(e) => debug!("Failed to encode kick for {}: {}", self.info.name(), e),
        }
        self.sink.close().await;
    }
}

/// Opens backend attachments on behalf of a session.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Connects to `target`, replays the player's `handshake`, and completes the
    /// backend login. A refusal with a reason is reported as `ProxyError::Kicked`.
    async fn connect(
        &self,
        handshake: &Bytes,
        target: &Arc<ServerInfo>,
    ) -> Result<ServerConnection, ProxyError>;
}

/// Connects to backends over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    plugin_channels: Vec<String>,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration, plugin_channels: Vec<String>) -> Self {
        Self {
            connect_timeout,
            plugin_channels,
        }
    }

    /// Reads backend packets until the login completes or is refused.
    async fn await_login(
        reader: &mut PacketStream,
        sink: &PacketSink,
    ) -> Result<LoginParams, ProxyError> {
        loop {
            let frame = reader
                .next()
                .await
                .ok_or_else(|| ProxyError::from(io::Error::from(io::ErrorKind::UnexpectedEof)))??;
            match Packet::decode(&frame)? {
                Packet::EncryptionRequest => {
                    // Offline-mode backends only: acknowledge and ask to spawn.
                    sink.send(Packet::ClientStatus { payload: 0 }.encode()?)
                        .await?;
                }
                Packet::Login(login) => return Ok(login),
                Packet::Kick { reason } => return Err(ProxyError::Kicked(reason)),
                other => trace!(
                    "Ignoring packet {:#04x} while waiting for backend login",
                    other.tag()
                ),
            }
        }
    }
}

#[async_trait]
impl BackendConnector for TcpConnector {
    async fn connect(
        &self,
        handshake: &Bytes,
        target: &Arc<ServerInfo>,
    ) -> Result<ServerConnection, ProxyError> {
        debug!("Connecting to backend {} at {}", target.name(), target.address());
        let stream = timeout(self.connect_timeout, TcpStream::connect(target.address())).await??;
        stream.set_nodelay(true)?;

        let (mut reader, sink) = transport::split(stream);
        if handshake.first() != Some(&ids::HANDSHAKE) {
            return Err(ProxyError::Internal(
                "session handshake is not a handshake packet".into(),
            ));
        }
        sink.send(handshake.clone()).await?;

        let login = timeout(self.connect_timeout, Self::await_login(&mut reader, &sink)).await??;

        let register = Packet::PluginMessage {
            channel: REGISTER_CHANNEL.to_string(),
            data: register_payload(&self.plugin_channels),
        }
        .encode()?;
        sink.send(register).await?;

        info!(
            "Backend {} accepted login (entity id {}).",
            target.name(),
            login.entity_id
        );
        Ok(ServerConnection::from_parts(
            Arc::clone(target),
            login,
            reader,
            sink,
        ))
    }
}
