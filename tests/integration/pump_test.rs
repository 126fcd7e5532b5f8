// tests/integration/pump_test.rs

//! Relaying in both directions: ordering, injected packets, entity ids and dispatch.

use super::test_helpers::*;
use bytes::Bytes;
use mcrelay::core::ProxyError;
use mcrelay::core::events::{Listener, ProxyEvent};
use mcrelay::core::protocol::Packet;
use std::sync::Arc;
use std::time::Duration;

fn animation(entity_id: i32) -> Vec<u8> {
    let mut frame = vec![0x12];
    frame.extend_from_slice(&entity_id.to_be_bytes());
    frame.push(1);
    frame
}

fn use_entity(user: i32, target: i32) -> Vec<u8> {
    let mut frame = vec![0x07];
    frame.extend_from_slice(&user.to_be_bytes());
    frame.extend_from_slice(&target.to_be_bytes());
    frame.push(0);
    frame
}

#[tokio::test]
async fn test_first_connect_sends_login_and_registration() {
    let mut proxy = TestProxy::new();
    let mut client = proxy.client("alice");
    client.user.connect(proxy.server("lobby")).await;
    let backend = proxy.next_backend().await;

    match client.recv().await {
        Packet::Login(login) => assert_eq!(login.entity_id, 100),
        other => panic!("expected login, got {other:?}"),
    }
    assert_eq!(
        client.recv().await,
        Packet::PluginMessage {
            channel: "REGISTER".to_string(),
            data: Bytes::from_static(b"BungeeCord\0Stats"),
        }
    );

    assert_eq!(backend.server, "lobby");
    assert_eq!(Packet::decode(&backend.handshake).unwrap().tag(), 0x02);
    assert!(client.user.is_connected());
    assert_eq!(client.user.client_entity_id(), 100);
    assert_eq!(client.user.server_entity_id(), 100);
    assert!(proxy.server("lobby").has_player("alice"));
    assert!(proxy.state.session("alice").is_some());

    let attachment = format!("{:?}", client.user.server().unwrap());
    assert!(attachment.contains("\"lobby\""), "{attachment}");
    assert!(attachment.contains("entity_id: 100"), "{attachment}");
}

#[tokio::test]
async fn test_downstream_order_with_injected_message() {
    let mut proxy = TestProxy::new();
    let (mut client, mut backend) = proxy.join("alice").await;

    backend.send_raw(&opaque_packet(1)).await;
    assert_eq!(&client.recv_raw().await[..], &opaque_packet(1)[..]);

    client.user.send_message("A").unwrap();
    client.user.send_message("B").unwrap();
    backend.send_raw(&opaque_packet(2)).await;

    // Injected messages go out, in order, ahead of the packet that triggered the drain.
    for message in ["A", "B"] {
        assert_eq!(
            client.recv().await,
            Packet::Chat {
                message: message.to_string()
            }
        );
    }
    assert_eq!(&client.recv_raw().await[..], &opaque_packet(2)[..]);
}

#[tokio::test]
async fn test_upstream_drains_injected_data_first() {
    let mut proxy = TestProxy::new();
    let (mut client, mut backend) = proxy.join("alice").await;

    client
        .user
        .send_data("Stats", Bytes::from_static(b"xyz"))
        .unwrap();
    client.send_raw(&[0x0A, 1]).await;

    assert_eq!(
        backend.recv().await,
        Packet::PluginMessage {
            channel: "Stats".to_string(),
            data: Bytes::from_static(b"xyz"),
        }
    );
    assert_eq!(&backend.recv_raw().await[..], &[0x0A, 1]);
}

#[tokio::test]
async fn test_send_data_without_backend_fails() {
    let proxy = TestProxy::new();
    let client = proxy.client("alice");
    assert!(matches!(
        client.user.send_data("Stats", Bytes::new()),
        Err(ProxyError::NotConnected)
    ));
}

#[tokio::test]
async fn test_entity_ids_follow_the_current_backend() {
    let mut proxy = TestProxy::new();
    let (mut client, mut lobby) = proxy.join("alice").await;

    // Same ids on first join: packets pass unchanged.
    lobby.send_raw(&animation(100)).await;
    assert_eq!(&client.recv_raw().await[..], &animation(100)[..]);

    client.user.connect(proxy.server("pvp")).await;
    let mut pvp = proxy.next_backend().await;
    client.expect_switch_respawns().await;
    assert_eq!(client.user.server_entity_id(), 200);

    pvp.send_raw(&animation(200)).await;
    assert_eq!(&client.recv_raw().await[..], &animation(100)[..]);

    // The client's own id and the backend's id for it are swapped, others are kept.
    client.send_raw(&use_entity(100, 555)).await;
    assert_eq!(&pvp.recv_raw().await[..], &use_entity(200, 555)[..]);

    pvp.send_raw(&animation(555)).await;
    assert_eq!(&client.recv_raw().await[..], &animation(555)[..]);
}

#[tokio::test]
async fn test_keepalive_round_trip_updates_ping() {
    let mut proxy = TestProxy::new();
    let (mut client, mut backend) = proxy.join("alice").await;

    backend.send(Packet::KeepAlive { id: 7 }).await;
    assert_eq!(client.recv().await, Packet::KeepAlive { id: 7 });
    tokio::time::sleep(Duration::from_millis(30)).await;

    // A reply that does not match the last probe is relayed but not timed.
    client.send(Packet::KeepAlive { id: 8 }).await;
    assert_eq!(backend.recv().await, Packet::KeepAlive { id: 8 });
    assert_eq!(client.user.ping(), 0);

    client.send(Packet::KeepAlive { id: 7 }).await;
    assert_eq!(backend.recv().await, Packet::KeepAlive { id: 7 });
    assert!(client.user.ping() >= 30);
}

#[tokio::test]
async fn test_private_channel_from_client_is_dropped() {
    let mut proxy = TestProxy::new();
    let (mut client, mut backend) = proxy.join("alice").await;

    client.send(connect_request("pvp")).await;
    client
        .send(Packet::Chat {
            message: "hi".to_string(),
        })
        .await;

    assert_eq!(
        backend.recv().await,
        Packet::Chat {
            message: "hi".to_string()
        }
    );
    assert!(proxy.no_pending_backend());
    assert_eq!(
        client.user.server().unwrap().info().name(),
        "lobby"
    );
}

struct BlockWord(&'static str);

impl Listener for BlockWord {
    fn on_event(&self, event: &mut ProxyEvent) -> bool {
        match event {
            ProxyEvent::Chat(chat) => chat.message.contains(self.0),
            _ => false,
        }
    }
}

#[tokio::test]
async fn test_cancelled_chat_is_not_relayed() {
    let mut proxy = TestProxy::new();
    proxy.state.event_bus.register(Arc::new(BlockWord("secret")));
    let (mut client, mut backend) = proxy.join("alice").await;

    for message in ["my secret", "public"] {
        client
            .send(Packet::Chat {
                message: message.to_string(),
            })
            .await;
    }
    assert_eq!(
        backend.recv().await,
        Packet::Chat {
            message: "public".to_string()
        }
    );

    for message in ["secret plans", "news"] {
        backend
            .send(Packet::Chat {
                message: message.to_string(),
            })
            .await;
    }
    assert_eq!(
        client.recv().await,
        Packet::Chat {
            message: "news".to_string()
        }
    );
}

#[tokio::test]
async fn test_other_plugin_channels_pass_through() {
    let mut proxy = TestProxy::new();
    let (mut client, mut backend) = proxy.join("alice").await;

    let stats = Packet::PluginMessage {
        channel: "Stats".to_string(),
        data: Bytes::from_static(&[9, 9]),
    };
    backend.send(stats.clone()).await;
    assert_eq!(client.recv().await, stats);

    client.send(stats.clone()).await;
    assert_eq!(backend.recv().await, stats);
}
