// tests/integration/forward_test.rs

//! Backend-to-backend messaging over the private channel.

use super::test_helpers::*;
use bytes::Bytes;
use mcrelay::core::protocol::Packet;

fn pending(proxy: &TestProxy) -> Vec<usize> {
    ["lobby", "pvp", "creative"]
        .into_iter()
        .map(|s| proxy.server(s).pending_len())
        .collect()
}

#[tokio::test]
async fn test_forward_to_all_queues_once_per_server() {
    let mut proxy = TestProxy::new();
    let (mut client, mut lobby) = proxy.join("alice").await;

    lobby.send(forward_request("ALL", "Stats", &[1, 2, 3])).await;
    lobby.send_raw(&opaque_packet(1)).await;

    // The forward request is consumed by the proxy; the next packet is the marker.
    assert_eq!(&client.recv_raw().await[..], &opaque_packet(1)[..]);
    assert_eq!(pending(&proxy), vec![1, 1, 1]);

    let expected = Packet::PluginMessage {
        channel: "Stats".to_string(),
        data: Bytes::from_static(&[1, 2, 3]),
    }
    .encode()
    .unwrap();
    assert_eq!(proxy.server("creative").take_pending(), vec![expected]);
}

#[tokio::test]
async fn test_forward_to_named_server() {
    let mut proxy = TestProxy::new();
    let (mut client, mut lobby) = proxy.join("alice").await;

    lobby.send(forward_request("pvp", "Stats", b"hi")).await;
    lobby.send_raw(&opaque_packet(1)).await;

    assert_eq!(&client.recv_raw().await[..], &opaque_packet(1)[..]);
    assert_eq!(pending(&proxy), vec![0, 1, 0]);
}

#[tokio::test]
async fn test_forward_to_unknown_server_is_dropped() {
    let mut proxy = TestProxy::new();
    let (mut client, mut lobby) = proxy.join("alice").await;

    lobby.send(forward_request("nowhere", "Stats", b"hi")).await;
    lobby.send_raw(&opaque_packet(1)).await;

    assert_eq!(&client.recv_raw().await[..], &opaque_packet(1)[..]);
    assert_eq!(pending(&proxy), vec![0, 0, 0]);
    assert!(client.user.is_connected());
}

#[tokio::test]
async fn test_forwarded_message_reaches_target_with_next_upstream_packet() {
    let mut proxy = TestProxy::new();
    let (mut alice, mut alice_lobby) = proxy.join("alice").await;
    let (mut bob, _bob_lobby) = proxy.join("bob").await;
    bob.user.connect(proxy.server("pvp")).await;
    let mut bob_pvp = proxy.next_backend().await;
    bob.expect_switch_respawns().await;

    alice_lobby
        .send(forward_request("pvp", "Stats", b"score"))
        .await;
    alice_lobby.send_raw(&opaque_packet(1)).await;
    assert_eq!(&alice.recv_raw().await[..], &opaque_packet(1)[..]);

    bob.send_raw(&[0x0A, 1]).await;
    assert_eq!(
        bob_pvp.recv().await,
        Packet::PluginMessage {
            channel: "Stats".to_string(),
            data: Bytes::from_static(b"score"),
        }
    );
    assert_eq!(&bob_pvp.recv_raw().await[..], &[0x0A, 1]);
    assert_eq!(proxy.server("pvp").pending_len(), 0);
}
