// tests/property/decode_test.rs

//! Decoders reject malformed input with an error instead of panicking.

use bytes::BytesMut;
use mcrelay::core::protocol::plugin_channel::{PRIVATE_CHANNEL, register_payload};
use mcrelay::core::protocol::{ChannelMessage, Packet, PacketCodec};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_packet_decode_never_panics(frame in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = Packet::decode(&frame);
    }

    #[test]
    fn test_channel_message_decode_never_panics(payload in prop::collection::vec(any::<u8>(), 0..128)) {
        let _ = ChannelMessage::decode(&payload);
    }

    #[test]
    fn test_codec_consumes_only_whole_frames(input in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut codec = PacketCodec;
        let mut buf = BytesMut::from(&input[..]);
        let mut consumed = 0usize;
        loop {
            let before = buf.len();
            match codec.decode(&mut buf) {
                Ok(Some(frame)) => {
                    prop_assert!(!frame.is_empty());
                    consumed += before - buf.len();
                }
                Ok(None) | Err(_) => break,
            }
        }
        prop_assert_eq!(consumed + buf.len(), input.len());
    }

    #[test]
    fn test_encoded_strings_decode_back(message in "\\PC{0,200}") {
        let packet = Packet::Chat { message };
        let encoded = packet.encode().unwrap();
        prop_assert_eq!(Packet::decode(&encoded).unwrap(), packet);
    }

    #[test]
    fn test_register_payload_starts_with_private_channel(
        extra in prop::collection::vec("[A-Za-z]{0,12}", 0..6)
    ) {
        let payload = register_payload(&extra);
        let names: Vec<&[u8]> = payload.split(|b| *b == 0).collect();
        prop_assert_eq!(names[0], PRIVATE_CHANNEL.as_bytes());
        prop_assert!(names.iter().all(|n| !n.is_empty()));
    }
}
