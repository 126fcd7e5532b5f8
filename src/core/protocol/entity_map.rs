// src/core/protocol/entity_map.rs

//! Rewrites the player's own entity id inside relayed packets.
//!
//! Each backend assigns the player its own entity id, while the client keeps the one it
//! was given on first join. Packets that carry entity ids at fixed offsets are patched
//! in place as they cross the proxy, so the client's view stays consistent.

/// Tag of the destroy-entity packet, which carries a counted array of ids.
const DESTROY_ENTITY: u8 = 0x1D;

/// Byte offsets (from the start of the packet, tag included) of 4-byte big-endian
/// entity id fields, per packet type.
fn entity_id_offsets(tag: u8) -> &'static [usize] {
    match tag {
        0x05 => &[1],    // entity equipment
        0x07 => &[1, 5], // use entity (user, target)
        0x11 => &[1],    // use bed
        0x12 => &[1],    // animation
        0x13 => &[1],    // entity action
        0x14 => &[1],    // named entity spawn
        0x16 => &[1, 5], // collect item (collected, collector)
        0x17 => &[1, 20], // spawn object (object, thrower)
        0x18 => &[1],    // spawn mob
        0x19 => &[1],    // spawn painting
        0x1A => &[1],    // spawn experience orb
        0x1C => &[1],    // entity velocity
        0x1E => &[1],    // entity
        0x1F => &[1],    // entity relative move
        0x20 => &[1],    // entity look
        0x21 => &[1],    // entity look and relative move
        0x22 => &[1],    // entity teleport
        0x23 => &[1],    // entity head look
        0x26 => &[1],    // entity status
        0x27 => &[1, 5], // attach entity (rider, vehicle)
        0x28 => &[1],    // entity metadata
        0x29 => &[1],    // entity effect
        0x2A => &[1],    // remove entity effect
        0x37 => &[1],    // block break animation
        0x47 => &[1],    // thunderbolt
        _ => &[],
    }
}

/// Returns true when packets with this tag may carry an entity id the rewriter touches.
pub fn carries_entity_ids(tag: u8) -> bool {
    tag == DESTROY_ENTITY || !entity_id_offsets(tag).is_empty()
}

/// Swaps `source` and `destination` in every known entity id field of `packet`.
///
/// A field equal to `source` becomes `destination` and vice versa, so applying the same
/// pair in the opposite direction restores the original bytes. Fields that would run
/// past the end of the buffer are skipped; the buffer length never changes.
pub fn rewrite(packet: &mut [u8], source: i32, destination: i32) {
    if source == destination {
        return;
    }
    let Some(&tag) = packet.first() else {
        return;
    };

    if tag == DESTROY_ENTITY {
        let Some(&count) = packet.get(1) else {
            return;
        };
        for i in 0..usize::from(count) {
            swap_at(packet, 2 + i * 4, source, destination);
        }
        return;
    }

    for &offset in entity_id_offsets(tag) {
        swap_at(packet, offset, source, destination);
    }
}

fn swap_at(packet: &mut [u8], offset: usize, source: i32, destination: i32) {
    let Some(field) = packet.get_mut(offset..offset + 4) else {
        return;
    };
    let mut raw = [0u8; 4];
    raw.copy_from_slice(field);
    let value = i32::from_be_bytes(raw);
    if value == source {
        field.copy_from_slice(&destination.to_be_bytes());
    } else if value == destination {
        field.copy_from_slice(&source.to_be_bytes());
    }
}
