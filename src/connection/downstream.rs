// src/connection/downstream.rs

//! The downstream pump: relays packets from one backend attachment to the client.
//!
//! A fresh pump is started for every attachment and stopped before the next one
//! begins, so at most one pump per session is ever reading from a backend.

use super::backend::ServerConnection;
use super::user::{UserConnection, failure_reason};
use crate::core::ProxyError;
use crate::core::events::{ChatEvent, Endpoint, PluginMessageEvent, ProxyEvent};
use crate::core::metrics;
use crate::core::protocol::plugin_channel::FORWARD_ALL;
use crate::core::protocol::{ChannelMessage, PRIVATE_CHANNEL, Packet, entity_map};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Whether the pump keeps reading after a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(crate) async fn run(
    user: Arc<UserConnection>,
    server: Arc<ServerConnection>,
    cancel: CancellationToken,
) {
    let Some(mut reader) = server.take_reader() else {
        warn!(
            "Backend stream for {} on {} was already taken",
            user.name(),
            server.info().name()
        );
        return;
    };
    user.downstream_started();
    debug!("Downstream pump started for {} on {}", user.name(), server.info().name());

    let mut failed = false;
    while !user.is_reconnecting() && server.is_open() {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = reader.next() => frame,
        };
        // A switch began while this read was pending; the packet belongs to the old world.
        if user.is_reconnecting() {
            break;
        }

        let result = match frame {
            Some(Ok(frame)) => relay(&user, &server, frame).await,
            Some(Err(e)) => Err(e),
            None => Err(ProxyError::from(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "backend closed the connection",
            ))),
        };

        match result {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(e) => {
                if cancel.is_cancelled() {
                    break;
                }
                warn!(
                    "Downstream relay for {} from {} failed: {}",
                    user.name(),
                    server.info().name(),
                    e
                );
                metrics::SESSION_TEARDOWNS_TOTAL
                    .with_label_values(&["failure"])
                    .inc();
                user.destroy_self(&failure_reason(&e)).await;
                failed = true;
                break;
            }
        }
    }

    // A stopped pump leaves the stream in place so relaying can resume on this attachment.
    if !failed {
        server.restore_reader(reader);
    }
    user.downstream_stopped();
    debug!("Downstream pump stopped for {} on {}", user.name(), server.info().name());
}

/// Handles one backend packet: dispatch, queue drain, id rewrite, forward.
async fn relay(
    user: &Arc<UserConnection>,
    server: &Arc<ServerConnection>,
    mut frame: BytesMut,
) -> Result<Flow, ProxyError> {
    let state = user.state();
    let mut forward = true;

    match Packet::decode(&frame)? {
        Packet::KeepAlive { id } => user.record_ping_probe(id),
        Packet::Chat { message } => {
            let mut event = ProxyEvent::Chat(ChatEvent {
                sender: Endpoint::Server(server.info().name().to_string()),
                receiver: Endpoint::Player(user.name().to_string()),
                message,
            });
            forward = !state.event_bus.fire(&mut event);
        }
        Packet::PlayerListItem {
            username,
            online,
            ping,
        } => {
            forward = state.tab_list.on_list_update(user, &username, online, ping);
        }
        Packet::PluginMessage { channel, data } => {
            let mut event = ProxyEvent::PluginMessage(PluginMessageEvent {
                sender: Endpoint::Server(server.info().name().to_string()),
                receiver: Endpoint::Player(user.name().to_string()),
                tag: channel.clone(),
                data: data.clone(),
            });
            forward = !state.event_bus.fire(&mut event);
            if forward && channel == PRIVATE_CHANNEL {
                forward = false;
                let message = ChannelMessage::decode(&data)?;
                if handle_channel_message(user, message)? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }
        }
        _ => {}
    }

    user.client_out()
        .send_all(user.packet_queue().drain())
        .await?;

    entity_map::rewrite(
        &mut frame,
        user.server_entity_id(),
        user.client_entity_id(),
    );
    if forward {
        user.client_out().send(frame.freeze()).await?;
        metrics::PACKETS_FORWARDED_TOTAL
            .with_label_values(&["downstream"])
            .inc();
    }
    Ok(Flow::Continue)
}

/// Acts on a private-channel control message sent by the backend.
fn handle_channel_message(
    user: &Arc<UserConnection>,
    message: ChannelMessage,
) -> Result<Flow, ProxyError> {
    let state = user.state();
    match message {
        ChannelMessage::Forward {
            target,
            channel,
            data,
        } => {
            if target == FORWARD_ALL {
                for server in state.servers.values() {
                    server.send_data(&channel, Bytes::clone(&data))?;
                }
            } else if let Some(server) = state.server(&target) {
                server.send_data(&channel, data)?;
            } else {
                debug!("Forward from {} to unknown server '{}' ignored", user.name(), target);
            }
            Ok(Flow::Continue)
        }
        ChannelMessage::Connect { server } => match state.server(&server) {
            Some(target) => {
                info!("{} requested a move to {}", user.name(), target.name());
                // The switch joins this pump, so it must run outside of it.
                let user = Arc::clone(user);
                tokio::spawn(async move { user.connect(target).await });
                Ok(Flow::Stop)
            }
            None => {
                debug!("Connect for {} to unknown server '{}' ignored", user.name(), server);
                Ok(Flow::Continue)
            }
        },
        ChannelMessage::Disconnect => Ok(Flow::Stop),
        ChannelMessage::Unknown(opcode) => {
            trace!("Ignoring unknown control opcode '{}' for {}", opcode, user.name());
            Ok(Flow::Continue)
        }
    }
}
