// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use dashmap::{DashMap, DashSet};
use futures::{SinkExt, StreamExt};
use mcrelay::config::{Config, ServerConfig};
use mcrelay::connection::{BackendConnector, ServerConnection, UserConnection, transport};
use mcrelay::core::ProxyError;
use mcrelay::core::protocol::{LoginParams, PRIVATE_CHANNEL, Packet, PacketCodec};
use mcrelay::core::state::{Collaborators, ProxyState, ServerInfo};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, duplex};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, reload};

/// How long a test waits for any single packet or condition.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

const PIPE_CAPACITY: usize = 64 * 1024;

pub type PeerStream = Framed<DuplexStream, PacketCodec>;

/// Installs a test-friendly subscriber once per test binary.
pub fn init_tracing() {
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Three backends: `lobby` (default), `pvp` and `creative`, plus one extra plugin channel.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.servers.insert(
        "pvp".to_string(),
        ServerConfig {
            address: "127.0.0.1:25566".to_string(),
        },
    );
    config.servers.insert(
        "creative".to_string(),
        ServerConfig {
            address: "127.0.0.1:25567".to_string(),
        },
    );
    config.plugin_channels = vec!["Stats".to_string()];
    config
}

/// The far end of one backend attachment, as seen by the fake backend server.
pub struct BackendPeer {
    pub server: String,
    pub handshake: Bytes,
    pub stream: PeerStream,
}

impl BackendPeer {
    pub async fn send(&mut self, packet: Packet) {
        send_packet(&mut self.stream, packet).await;
    }

    pub async fn send_raw(&mut self, frame: &[u8]) {
        send_raw(&mut self.stream, frame).await;
    }

    pub async fn recv(&mut self) -> Packet {
        recv_packet(&mut self.stream).await
    }

    pub async fn recv_raw(&mut self) -> BytesMut {
        recv_raw(&mut self.stream).await
    }

    pub async fn expect_closed(&mut self) {
        expect_closed(&mut self.stream).await;
    }
}

/// A connector that hands out in-memory backends instead of dialing TCP.
///
/// Every successful attach produces a `BackendPeer` on the proxy's channel.
pub struct MockConnector {
    entity_ids: DashMap<String, i32>,
    refusals: DashMap<String, String>,
    unreachable: DashSet<String>,
    peers: mpsc::UnboundedSender<BackendPeer>,
    connects: AtomicUsize,
}

impl MockConnector {
    fn new(peers: mpsc::UnboundedSender<BackendPeer>) -> Self {
        let entity_ids = DashMap::new();
        entity_ids.insert("lobby".to_string(), 100);
        entity_ids.insert("pvp".to_string(), 200);
        entity_ids.insert("creative".to_string(), 300);
        Self {
            entity_ids,
            refusals: DashMap::new(),
            unreachable: DashSet::new(),
            peers,
            connects: AtomicUsize::new(0),
        }
    }

    /// Makes `server` reject logins with `reason`.
    pub fn refuse(&self, server: &str, reason: &str) {
        self.refusals
            .insert(server.to_string(), reason.to_string());
    }

    /// Makes connections to `server` fail at the socket level.
    pub fn make_unreachable(&self, server: &str) {
        self.unreachable.insert(server.to_string());
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

/// The login every fake backend answers with.
pub fn login_for(entity_id: i32, dimension: i8) -> LoginParams {
    LoginParams {
        entity_id,
        level_type: "default".to_string(),
        game_mode: 0,
        dimension,
        difficulty: 1,
        max_players: 20,
    }
}

#[async_trait]
impl BackendConnector for MockConnector {
    async fn connect(
        &self,
        handshake: &Bytes,
        target: &Arc<ServerInfo>,
    ) -> Result<ServerConnection, ProxyError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.contains(target.name()) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        if let Some(reason) = self.refusals.get(target.name()) {
            return Err(ProxyError::Kicked(reason.value().clone()));
        }

        let entity_id = self
            .entity_ids
            .get(target.name())
            .map(|e| *e.value())
            .unwrap_or(1);
        let (proxy_side, backend_side) = duplex(PIPE_CAPACITY);
        let _ = self.peers.send(BackendPeer {
            server: target.name().to_string(),
            handshake: handshake.clone(),
            stream: Framed::new(backend_side, PacketCodec),
        });
        Ok(ServerConnection::new(
            Arc::clone(target),
            login_for(entity_id, 0),
            proxy_side,
        ))
    }
}

/// A player's game client, connected to the proxy through an in-memory pipe.
pub struct TestClient {
    pub user: Arc<UserConnection>,
    pub stream: PeerStream,
}

impl TestClient {
    pub async fn send(&mut self, packet: Packet) {
        send_packet(&mut self.stream, packet).await;
    }

    pub async fn send_raw(&mut self, frame: &[u8]) {
        send_raw(&mut self.stream, frame).await;
    }

    pub async fn recv(&mut self) -> Packet {
        recv_packet(&mut self.stream).await
    }

    pub async fn recv_raw(&mut self) -> BytesMut {
        recv_raw(&mut self.stream).await
    }

    pub async fn expect_closed(&mut self) {
        expect_closed(&mut self.stream).await;
    }

    /// Reads the three world transitions a server switch sends and returns the last one.
    pub async fn expect_switch_respawns(&mut self) -> Packet {
        for dimension in [1, -1] {
            match self.recv().await {
                Packet::Respawn { dimension: d, .. } => assert_eq!(d, dimension),
                other => panic!("expected placeholder respawn, got {other:?}"),
            }
        }
        let last = self.recv().await;
        assert!(matches!(last, Packet::Respawn { .. }), "got {last:?}");
        last
    }
}

/// A proxy state wired to a `MockConnector`.
pub struct TestProxy {
    pub state: Arc<ProxyState>,
    pub connector: Arc<MockConnector>,
    backends: mpsc::UnboundedReceiver<BackendPeer>,
}

impl TestProxy {
    pub fn new() -> Self {
        Self::with_setup(test_config(), |_| {})
    }

    /// Builds the proxy after letting the test replace collaborators.
    pub fn with_setup(config: Config, setup: impl FnOnce(&mut Collaborators)) -> Self {
        init_tracing();
        let (tx, backends) = mpsc::unbounded_channel();
        let connector = Arc::new(MockConnector::new(tx));
        let mut collaborators = Collaborators::defaults(&config);
        collaborators.connector = Arc::clone(&connector) as Arc<dyn BackendConnector>;
        setup(&mut collaborators);
        Self {
            state: ProxyState::with_collaborators(config, collaborators),
            connector,
            backends,
        }
    }

    pub fn server(&self, name: &str) -> Arc<ServerInfo> {
        self.state.server(name).expect("server is configured")
    }

    /// Creates a session for `name` without attaching it to any backend.
    pub fn client(&self, name: &str) -> TestClient {
        let handshake = Packet::Handshake {
            protocol_version: 51,
            username: name.to_string(),
            host: "localhost".to_string(),
            port: 25577,
        }
        .encode()
        .expect("handshake encodes");
        let (proxy_side, client_side) = duplex(PIPE_CAPACITY);
        let (reader, sink) = transport::split(proxy_side);
        let user = UserConnection::new(
            Arc::clone(&self.state),
            name.to_string(),
            handshake,
            "127.0.0.1:50000".parse().expect("valid address"),
            reader,
            sink,
        );
        TestClient {
            user,
            stream: Framed::new(client_side, PacketCodec),
        }
    }

    /// Logs `name` in to their initial server and consumes the login and channel
    /// registration the client receives.
    pub async fn join(&mut self, name: &str) -> (TestClient, BackendPeer) {
        let mut client = self.client(name);
        let target = self
            .state
            .initial_server_for(name)
            .expect("an initial server exists");
        client.user.connect(target).await;
        let backend = self.next_backend().await;

        assert!(matches!(client.recv().await, Packet::Login(_)));
        assert!(matches!(client.recv().await, Packet::PluginMessage { .. }));
        (client, backend)
    }

    pub async fn next_backend(&mut self) -> BackendPeer {
        tokio::time::timeout(RECV_TIMEOUT, self.backends.recv())
            .await
            .expect("timed out waiting for a backend attach")
            .expect("connector dropped")
    }

    /// True if no backend attach is pending.
    pub fn no_pending_backend(&mut self) -> bool {
        self.backends.try_recv().is_err()
    }
}

pub async fn send_packet<T: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut Framed<T, PacketCodec>,
    packet: Packet,
) {
    let frame = packet.encode().expect("packet encodes");
    stream.send(frame).await.expect("send succeeds");
}

pub async fn send_raw<T: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut Framed<T, PacketCodec>,
    frame: &[u8],
) {
    stream
        .send(Bytes::copy_from_slice(frame))
        .await
        .expect("send succeeds");
}

pub async fn recv_raw<T: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut Framed<T, PacketCodec>,
) -> BytesMut {
    tokio::time::timeout(RECV_TIMEOUT, stream.next())
        .await
        .expect("timed out waiting for a packet")
        .expect("stream closed while waiting for a packet")
        .expect("frame decodes")
}

pub async fn recv_packet<T: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut Framed<T, PacketCodec>,
) -> Packet {
    let frame = recv_raw(stream).await;
    Packet::decode(&frame).expect("packet decodes")
}

/// Asserts the other side closes the stream without sending anything further.
pub async fn expect_closed<T: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut Framed<T, PacketCodec>,
) {
    match tokio::time::timeout(RECV_TIMEOUT, stream.next()).await {
        Ok(None) => {}
        Ok(Some(frame)) => panic!("expected end of stream, got {frame:?}"),
        Err(_) => panic!("timed out waiting for end of stream"),
    }
}

/// Polls `condition` until it holds, failing the test after `RECV_TIMEOUT`.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A packet the proxy relays without inspecting (time update).
pub fn opaque_packet(marker: u8) -> Vec<u8> {
    vec![0x04, 0, 0, 0, 0, 0, 0, 0, marker]
}

/// A UTF-8 string with a u16 length prefix, as used on the private channel.
pub fn put_utf(dst: &mut BytesMut, s: &str) {
    dst.put_u16(s.len() as u16);
    dst.put_slice(s.as_bytes());
}

/// A plugin message on the private channel with the given payload.
pub fn private_message(payload: BytesMut) -> Packet {
    Packet::PluginMessage {
        channel: PRIVATE_CHANNEL.to_string(),
        data: payload.freeze(),
    }
}

pub fn connect_request(server: &str) -> Packet {
    let mut payload = BytesMut::new();
    put_utf(&mut payload, "Connect");
    put_utf(&mut payload, server);
    private_message(payload)
}

pub fn forward_request(target: &str, channel: &str, data: &[u8]) -> Packet {
    let mut payload = BytesMut::new();
    put_utf(&mut payload, "Forward");
    put_utf(&mut payload, target);
    put_utf(&mut payload, channel);
    payload.put_i16(data.len() as i16);
    payload.put_slice(data);
    private_message(payload)
}
