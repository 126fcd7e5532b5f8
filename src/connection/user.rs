// src/connection/user.rs

//! Defines `UserConnection`, which owns a player's session for its whole lifetime:
//! identity, the current backend attachment, entity id mapping, ping tracking,
//! permissions, and the protocol that moves the player between backends.

use super::backend::ServerConnection;
use super::transport::{PacketSink, PacketStream};
use super::{downstream, upstream};
use crate::core::events::{ProxyEvent, ServerConnectEvent};
use crate::core::metrics;
use crate::core::permissions::PermissionStore;
use crate::core::protocol::plugin_channel::{REGISTER_CHANNEL, register_payload};
use crate::core::protocol::Packet;
use crate::core::queue::PacketQueue;
use crate::core::state::{ProxyState, ServerInfo};
use crate::core::ProxyError;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shown to a player whose client closed the connection.
pub const END_OF_STREAM: &str = "End of stream";

/// Sent to a backend when the proxy drops the player from it.
const QUITTING: &str = "Quitting";

/// How long a kick may take to reach a client that has stopped reading.
const KICK_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// The player-visible message for an unexpected failure. Only the category is shown.
pub(crate) fn failure_reason(error: &ProxyError) -> String {
    format!("Internal proxy error - {}", error.category())
}

struct DownstreamTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A single player's session on the proxy.
pub struct UserConnection {
    name: String,
    display_name: RwLock<String>,
    address: SocketAddr,
    /// The client's original handshake, replayed to every backend.
    handshake: Bytes,
    state: Arc<ProxyState>,

    client_out: PacketSink,
    /// Handed to the upstream pump when the first backend attaches.
    client_in: Mutex<Option<PacketStream>>,
    /// Packets injected toward the client, written ahead of the next downstream packet.
    packet_queue: PacketQueue,

    /// The current backend attachment. Replaced as a whole on every switch.
    server: RwLock<Option<Arc<ServerConnection>>>,
    downstream: Mutex<Option<DownstreamTask>>,
    active_downstreams: AtomicUsize,
    /// Serializes `connect` calls.
    switch_lock: tokio::sync::Mutex<()>,

    /// The entity id the client was given on first join. Never changes afterwards.
    client_entity_id: AtomicI32,
    /// The entity id the current backend uses for this player.
    server_entity_id: AtomicI32,
    /// Set while the old backend is being torn down and the new one set up.
    reconnecting: AtomicBool,

    /// The last keepalive id sent to the client, and when it went out.
    ping_probe: Mutex<Option<(i32, Instant)>>,
    ping: AtomicI32,

    permissions: PermissionStore,

    /// Cancelled on teardown; stops the upstream pump and any downstream pump.
    shutdown: CancellationToken,
    /// Cancelled once teardown has released every resource.
    torn_down: CancellationToken,
    disconnected: AtomicBool,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for UserConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConnection")
            .field("name", &self.name)
            .field("address", &self.address)
            .field(
                "server",
                &self.server().map(|s| s.info().name().to_string()),
            )
            .field("reconnecting", &self.is_reconnecting())
            .finish()
    }
}

impl UserConnection {
    /// Creates the session for an authenticated player and loads their configured groups.
    pub fn new(
        state: Arc<ProxyState>,
        name: String,
        handshake: Bytes,
        address: SocketAddr,
        client_in: PacketStream,
        client_out: PacketSink,
    ) -> Arc<Self> {
        let permissions = PermissionStore::new(Arc::clone(&state.configuration));
        permissions.add_groups(&state.configuration.groups_for(&name));

        Arc::new(Self {
            display_name: RwLock::new(name.clone()),
            name,
            address,
            handshake,
            state,
            client_out,
            client_in: Mutex::new(Some(client_in)),
            packet_queue: PacketQueue::new(),
            server: RwLock::new(None),
            downstream: Mutex::new(None),
            active_downstreams: AtomicUsize::new(0),
            switch_lock: tokio::sync::Mutex::new(()),
            client_entity_id: AtomicI32::new(0),
            server_entity_id: AtomicI32::new(0),
            reconnecting: AtomicBool::new(false),
            ping_probe: Mutex::new(None),
            ping: AtomicI32::new(0),
            permissions,
            shutdown: CancellationToken::new(),
            torn_down: CancellationToken::new(),
            disconnected: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        })
    }

    // --- Accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> String {
        self.display_name.read().clone()
    }

    /// Renames the player in the roster by removing and re-adding them.
    pub fn set_display_name(&self, display_name: &str) {
        self.state.tab_list.on_disconnect(self);
        *self.display_name.write() = display_name.to_string();
        self.state.tab_list.on_connect(self);
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn state(&self) -> &Arc<ProxyState> {
        &self.state
    }

    /// The most recent round-trip time in milliseconds.
    pub fn ping(&self) -> i32 {
        self.ping.load(Ordering::Relaxed)
    }

    /// The current backend attachment, resolved once. Do not hold it across a switch.
    pub fn server(&self) -> Option<Arc<ServerConnection>> {
        self.server.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        !self.destroyed.load(Ordering::SeqCst) && self.server.read().is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Resolves once the session has been torn down and all of its resources released.
    pub async fn closed(&self) {
        self.torn_down.cancelled().await;
    }

    pub fn client_entity_id(&self) -> i32 {
        self.client_entity_id.load(Ordering::Acquire)
    }

    pub fn server_entity_id(&self) -> i32 {
        self.server_entity_id.load(Ordering::Acquire)
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::Acquire)
    }

    /// The number of downstream pumps currently running for this session.
    pub fn active_downstream_pumps(&self) -> usize {
        self.active_downstreams.load(Ordering::SeqCst)
    }

    pub(crate) fn client_out(&self) -> &PacketSink {
        &self.client_out
    }

    pub(crate) fn packet_queue(&self) -> &PacketQueue {
        &self.packet_queue
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn downstream_started(&self) {
        self.active_downstreams.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn downstream_stopped(&self) {
        self.active_downstreams.fetch_sub(1, Ordering::SeqCst);
    }

    // --- Ping tracking ---

    /// Records a keepalive the backend sent toward the client.
    pub(crate) fn record_ping_probe(&self, id: i32) {
        *self.ping_probe.lock() = Some((id, Instant::now()));
    }

    /// Matches a client keepalive reply against the last probe and publishes the ping.
    pub(crate) fn complete_ping_probe(&self, id: i32) {
        let sent_at = match *self.ping_probe.lock() {
            Some((probe_id, sent_at)) if probe_id == id => sent_at,
            _ => return,
        };
        let ping = i32::try_from(sent_at.elapsed().as_millis()).unwrap_or(i32::MAX);
        self.state.tab_list.on_ping_change(self, ping);
        self.ping.store(ping, Ordering::Relaxed);
    }

    // --- Messaging ---

    /// Queues a chat message for the client. It is written before the next packet the
    /// downstream pump relays.
    pub fn send_message(&self, message: &str) -> Result<(), ProxyError> {
        let packet = Packet::Chat {
            message: message.to_string(),
        }
        .encode()?;
        self.packet_queue.push(packet);
        Ok(())
    }

    /// Queues a plugin message for the current backend. It is written before the next
    /// packet the upstream pump relays.
    pub fn send_data(&self, channel: &str, data: Bytes) -> Result<(), ProxyError> {
        let server = self.server().ok_or(ProxyError::NotConnected)?;
        let packet = Packet::PluginMessage {
            channel: channel.to_string(),
            data,
        }
        .encode()?;
        server.queue().push(packet);
        Ok(())
    }

    // --- Permissions ---

    pub fn groups(&self) -> HashSet<String> {
        self.permissions.groups()
    }

    pub fn add_groups<S: AsRef<str>>(&self, groups: &[S]) {
        self.permissions.add_groups(groups);
    }

    pub fn remove_groups<S: AsRef<str>>(&self, groups: &[S]) {
        self.permissions.remove_groups(groups);
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.has_permission(permission)
    }

    pub fn set_permission(&self, permission: &str, value: bool) {
        self.permissions.set_permission(permission, value);
    }

    // --- Attach and switch ---

    /// Attaches the player to `target`.
    ///
    /// The first call registers the session and starts both pumps. Later calls move the
    /// player off their current backend. Any failure tears the whole session down.
    pub async fn connect(self: &Arc<Self>, target: Arc<ServerInfo>) {
        let _switch = self.switch_lock.lock().await;
        if self.is_destroyed() {
            debug!("Ignoring connect for {}: session already ended", self.name);
            return;
        }

        let result = match self.server() {
            None => self.first_connect(target).await,
            Some(current) => self.switch(current, target).await,
        };

        if let Err(e) = result {
            self.reconnecting.store(false, Ordering::Release);
            match e {
                ProxyError::Kicked(reason) => {
                    info!("{} was kicked while connecting: {}", self.name, reason);
                    metrics::SESSION_TEARDOWNS_TOTAL
                        .with_label_values(&["kicked"])
                        .inc();
                    self.destroy_self(&reason).await;
                }
                other => {
                    warn!("{} could not connect to server: {}", self.name, other);
                    metrics::SESSION_TEARDOWNS_TOTAL
                        .with_label_values(&["failure"])
                        .inc();
                    self.destroy_self(&format!(
                        "Could not connect to server - {}",
                        other.category()
                    ))
                    .await;
                }
            }
        }
    }

    async fn first_connect(self: &Arc<Self>, target: Arc<ServerInfo>) -> Result<(), ProxyError> {
        self.state
            .sessions
            .insert(self.name.clone(), Arc::clone(self));
        self.state.tab_list.on_connect(self);
        self.state.tab_list.on_server_change(self);

        let new_server = Arc::new(self.state.connector.connect(&self.handshake, &target).await?);
        let login = new_server.login().clone();

        self.client_entity_id
            .store(login.entity_id, Ordering::Release);
        self.server_entity_id
            .store(login.entity_id, Ordering::Release);

        let register = Packet::PluginMessage {
            channel: REGISTER_CHANNEL.to_string(),
            data: register_payload(&self.state.config.plugin_channels),
        }
        .encode()?;
        if let Err(e) = self
            .client_out
            .send_all(vec![Packet::Login(login).encode()?, register])
            .await
        {
            new_server.disconnect(QUITTING).await;
            return Err(e);
        }

        let client_in = self.client_in.lock().take();
        let Some(reader) = client_in else {
            new_server.disconnect(QUITTING).await;
            return Err(ProxyError::Internal(
                "upstream pump was already started".into(),
            ));
        };

        self.attach(new_server, &target);
        tokio::spawn(upstream::run(Arc::clone(self), reader));
        info!("{} joined {}", self.name, target.name());
        Ok(())
    }

    async fn switch(
        self: &Arc<Self>,
        current: Arc<ServerConnection>,
        target: Arc<ServerInfo>,
    ) -> Result<(), ProxyError> {
        let mut event = ProxyEvent::ServerConnect(ServerConnectEvent {
            player: self.name.clone(),
            target,
        });
        let cancelled = self.state.event_bus.fire(&mut event);
        let ProxyEvent::ServerConnect(ServerConnectEvent { target, .. }) = event else {
            return Err(ProxyError::Internal("server connect event changed kind".into()));
        };
        if cancelled {
            info!("Switch of {} to {} was cancelled", self.name, target.name());
            // A backend Connect request may already have ended the pump; resume relaying.
            self.stop_downstream().await;
            self.start_downstream(current);
            return Ok(());
        }

        self.state.tab_list.on_server_change(self);
        self.reconnecting.store(true, Ordering::Release);

        // Two throwaway dimension changes make the client drop its cached world.
        self.client_out
            .send_all(vec![
                Packet::placeholder_respawn(1).encode()?,
                Packet::placeholder_respawn(-1).encode()?,
            ])
            .await?;

        let new_server = Arc::new(self.state.connector.connect(&self.handshake, &target).await?);

        if let Err(e) = self.finish_switch(&current, &new_server).await {
            new_server.disconnect(QUITTING).await;
            return Err(e);
        }

        self.attach(new_server, &target);
        metrics::SERVER_SWITCHES_TOTAL.inc();
        info!(
            "{} moved from {} to {}",
            self.name,
            current.info().name(),
            target.name()
        );
        Ok(())
    }

    /// Retires the old attachment and moves the client into the new backend's world.
    async fn finish_switch(
        &self,
        current: &Arc<ServerConnection>,
        new_server: &Arc<ServerConnection>,
    ) -> Result<(), ProxyError> {
        self.stop_downstream().await;

        current.disconnect(QUITTING).await;
        current.info().remove_player(&self.name);

        let login = new_server.login();
        self.server_entity_id
            .store(login.entity_id, Ordering::Release);
        self.client_out
            .send(Packet::respawn_for(login).encode()?)
            .await
    }

    /// Publishes `new_server` as the current attachment and starts relaying from it.
    fn attach(self: &Arc<Self>, new_server: Arc<ServerConnection>, target: &Arc<ServerInfo>) {
        self.reconnecting.store(false, Ordering::Release);
        *self.server.write() = Some(Arc::clone(&new_server));
        target.add_player(&self.name);

        // A teardown that raced with this attach may have missed the new server.
        if self.is_destroyed() {
            target.remove_player(&self.name);
            tokio::spawn(async move { new_server.disconnect(QUITTING).await });
            return;
        }
        self.start_downstream(new_server);
    }

    fn start_downstream(self: &Arc<Self>, server: Arc<ServerConnection>) {
        if self.is_destroyed() || !server.is_open() {
            return;
        }
        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(downstream::run(Arc::clone(self), server, cancel.clone()));
        if let Some(previous) = self
            .downstream
            .lock()
            .replace(DownstreamTask { cancel, handle })
        {
            // Only reachable if a pump outlived its switch; stop it rather than leak it.
            error!("{} had a downstream pump still registered", self.name);
            previous.cancel.cancel();
        }
    }

    /// Cancels the current downstream pump and waits until it has exited.
    async fn stop_downstream(&self) {
        let task = self.downstream.lock().take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                error!("Downstream pump for {} failed: {}", self.name, e);
            }
        }
    }

    // --- Teardown ---

    /// Removes the player from the roster and closes the client with `reason`.
    pub async fn disconnect(&self, reason: &str) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.tab_list.on_disconnect(self);

        match (Packet::Kick {
            reason: reason.to_string(),
        })
        .encode()
        {
            Ok(kick) => {
                match tokio::time::timeout(KICK_WRITE_TIMEOUT, self.client_out.send(kick)).await {
                    Ok(Err(e)) => debug!("Failed to send kick to {}: {}", self.name, e),
                    Err(_) => debug!("Timed out sending kick to {}", self.name),
                    Ok(Ok(())) => {}
                }
            }
            Err(e) => debug!("Failed to encode kick for {}: {}", self.name, e),
        }
        self.client_out.close().await;
    }

    /// Ends the session: unregisters it, closes the client with `reason`, and releases
    /// the current backend. Runs at most once; later calls wait for the first to finish.
    pub async fn destroy_self(&self, reason: &str) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            self.torn_down.cancelled().await;
            return;
        }
        info!("Disconnecting {}: {}", self.name, reason);

        self.state
            .sessions
            .remove_if(&self.name, |_, session| std::ptr::eq(Arc::as_ptr(session), self));

        // Signal the pumps. The caller may be one of them, so they are not awaited here.
        self.shutdown.cancel();
        self.downstream.lock().take();

        self.disconnect(reason).await;

        if let Some(server) = self.server() {
            server.info().remove_player(&self.name);
            server.disconnect(QUITTING).await;
            self.state.reconnect.set_server(self);
        }
        self.torn_down.cancel();
    }
}
