// src/connection/upstream.rs

//! The upstream pump: relays packets from the client to the current backend.
//!
//! One pump runs per session, from the first attach until teardown. It survives
//! backend switches by resolving the current attachment for every packet.

use super::transport::PacketStream;
use super::user::{END_OF_STREAM, UserConnection, failure_reason};
use crate::core::ProxyError;
use crate::core::events::{ChatEvent, Endpoint, PluginMessageEvent, ProxyEvent};
use crate::core::metrics;
use crate::core::protocol::{Packet, PRIVATE_CHANNEL, entity_map};
use bytes::BytesMut;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub(crate) async fn run(user: Arc<UserConnection>, mut reader: PacketStream) {
    let shutdown = user.shutdown_token();
    debug!("Upstream pump started for {}", user.name());

    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = reader.next() => frame,
        };

        let result = match frame {
            Some(Ok(frame)) => relay(&user, frame).await,
            Some(Err(e)) => Err(e),
            None => {
                metrics::SESSION_TEARDOWNS_TOTAL
                    .with_label_values(&["end_of_stream"])
                    .inc();
                user.destroy_self(END_OF_STREAM).await;
                break;
            }
        };

        if let Err(e) = result {
            if e.is_end_of_stream() {
                metrics::SESSION_TEARDOWNS_TOTAL
                    .with_label_values(&["end_of_stream"])
                    .inc();
                user.destroy_self(END_OF_STREAM).await;
            } else {
                warn!("Upstream relay for {} failed: {}", user.name(), e);
                metrics::SESSION_TEARDOWNS_TOTAL
                    .with_label_values(&["failure"])
                    .inc();
                user.destroy_self(&failure_reason(&e)).await;
            }
            break;
        }
    }

    debug!("Upstream pump stopped for {}", user.name());
}

/// Handles one client packet: dispatch, queue drain, id rewrite, forward.
async fn relay(user: &Arc<UserConnection>, mut frame: BytesMut) -> Result<(), ProxyError> {
    let Some(server) = user.server() else {
        trace!("Dropping client packet for {}: no backend attached", user.name());
        return Ok(());
    };
    let state = user.state();

    let forward = match Packet::decode(&frame)? {
        Packet::KeepAlive { id } => {
            user.complete_ping_probe(id);
            true
        }
        Packet::Chat { message } => {
            if let Some(command) = message.strip_prefix(state.config.command_prefix.as_str()) {
                let handled = state.commands.dispatch(user, command);
                trace!("Command '{}' from {} handled={}", command, user.name(), handled);
                !handled
            } else {
                let mut event = ProxyEvent::Chat(ChatEvent {
                    sender: Endpoint::Player(user.name().to_string()),
                    receiver: Endpoint::Server(server.info().name().to_string()),
                    message,
                });
                !state.event_bus.fire(&mut event)
            }
        }
        Packet::PluginMessage { channel, data } => {
            if channel == PRIVATE_CHANNEL {
                // Proxy-internal; clients never get to address backends on it.
                return Ok(());
            }
            let mut event = ProxyEvent::PluginMessage(PluginMessageEvent {
                sender: Endpoint::Player(user.name().to_string()),
                receiver: Endpoint::Server(server.info().name().to_string()),
                tag: channel,
                data,
            });
            !state.event_bus.fire(&mut event)
        }
        _ => true,
    };

    if !server.is_open() {
        trace!("Backend for {} is closed; dropping client packet", user.name());
        return Ok(());
    }

    let mut injected = server.queue().drain();
    injected.extend(server.info().take_pending());
    server.sink().send_all(injected).await?;

    entity_map::rewrite(
        &mut frame,
        user.client_entity_id(),
        user.server_entity_id(),
    );
    if forward {
        server.sink().send(frame.freeze()).await?;
        metrics::PACKETS_FORWARDED_TOTAL
            .with_label_values(&["upstream"])
            .inc();
    }
    Ok(())
}
