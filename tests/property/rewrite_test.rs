// tests/property/rewrite_test.rs

//! Entity id rewriting is length-preserving and undone by the reverse rewrite.

use mcrelay::core::protocol::entity_map::{carries_entity_ids, rewrite};
use proptest::prelude::*;

/// Packets that start with a tag the rewriter knows about, followed by ids that are
/// often equal to one of the two swapped values.
fn entity_packet(source: i32, destination: i32) -> impl Strategy<Value = Vec<u8>> {
    let tag = prop_oneof![
        Just(0x05u8),
        Just(0x07),
        Just(0x12),
        Just(0x16),
        Just(0x17),
        Just(0x1D),
        Just(0x27),
        Just(0x28),
        any::<u8>(),
    ];
    let id = prop_oneof![Just(source), Just(destination), any::<i32>()];
    (tag, prop::collection::vec(id, 0..8), prop::collection::vec(any::<u8>(), 0..4)).prop_map(
        |(tag, ids, tail)| {
            let mut packet = vec![tag];
            if tag == 0x1D {
                packet.push(ids.len() as u8);
            }
            for id in ids {
                packet.extend_from_slice(&id.to_be_bytes());
            }
            packet.extend_from_slice(&tail);
            packet
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 500,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_rewrite_round_trip(
        (source, destination, packet) in (any::<i32>(), any::<i32>())
            .prop_flat_map(|(s, d)| (Just(s), Just(d), entity_packet(s, d)))
    ) {
        let mut rewritten = packet.clone();
        rewrite(&mut rewritten, source, destination);
        prop_assert_eq!(rewritten.len(), packet.len());

        rewrite(&mut rewritten, destination, source);
        prop_assert_eq!(rewritten, packet);
    }

    #[test]
    fn test_rewrite_never_panics_on_arbitrary_bytes(
        mut packet in prop::collection::vec(any::<u8>(), 0..64),
        source in any::<i32>(),
        destination in any::<i32>(),
    ) {
        let len = packet.len();
        rewrite(&mut packet, source, destination);
        prop_assert_eq!(packet.len(), len);
    }

    #[test]
    fn test_untracked_packets_are_untouched(
        packet in prop::collection::vec(any::<u8>(), 1..64),
        source in any::<i32>(),
        destination in any::<i32>(),
    ) {
        prop_assume!(!carries_entity_ids(packet[0]));
        let mut rewritten = packet.clone();
        rewrite(&mut rewritten, source, destination);
        prop_assert_eq!(rewritten, packet);
    }
}
