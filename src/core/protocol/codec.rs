// src/core/protocol/codec.rs

//! Implements the packet framing used on both the client and backend sockets and the
//! corresponding `Encoder` and `Decoder` for network communication.
//!
//! Each frame is a VarInt length prefix followed by the packet body (tag byte, then
//! fields). The decoder hands out the raw body; dispatch decoding happens in `Packet`.

use crate::core::ProxyError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

// Protocol-level limits to prevent denial-of-service attacks.
pub const MAX_FRAME_SIZE: usize = 2 * 1024 * 1024; // 2MiB max packet body.
const MAX_VARINT_BYTES: usize = 5;

/// A `tokio_util::codec` implementation for length-prefixed game packets.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Encoder<Bytes> for PacketCodec {
    type Error = ProxyError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.is_empty() {
            return Err(ProxyError::Protocol("cannot send an empty packet".into()));
        }
        if item.len() > MAX_FRAME_SIZE {
            return Err(ProxyError::Protocol(format!(
                "packet of {} bytes exceeds frame limit",
                item.len()
            )));
        }
        dst.reserve(MAX_VARINT_BYTES + item.len());
        put_varint(dst, item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

impl Decoder for PacketCodec {
    type Item = BytesMut;
    type Error = ProxyError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((len, prefix)) = read_varint(src)? else {
            return Ok(None);
        };
        if len == 0 {
            return Err(ProxyError::Protocol("zero-length frame".into()));
        }
        if len > MAX_FRAME_SIZE {
            return Err(ProxyError::Protocol(format!(
                "frame of {len} bytes exceeds frame limit"
            )));
        }
        if src.len() < prefix + len {
            // Reserve up front so a large frame is read without repeated reallocations.
            src.reserve(prefix + len - src.len());
            return Ok(None);
        }
        src.advance(prefix);
        Ok(Some(src.split_to(len)))
    }
}

/// Parses a VarInt from the front of `src` without consuming it.
/// Returns the value and the number of prefix bytes, or `None` when more data is needed.
fn read_varint(src: &[u8]) -> Result<Option<(usize, usize)>, ProxyError> {
    let mut value: u32 = 0;
    for (i, byte) in src.iter().take(MAX_VARINT_BYTES).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value as usize, i + 1)));
        }
    }
    if src.len() >= MAX_VARINT_BYTES {
        return Err(ProxyError::Protocol("malformed frame length prefix".into()));
    }
    Ok(None)
}

fn put_varint(dst: &mut BytesMut, mut value: u32) {
    loop {
        if value & !0x7F == 0 {
            dst.put_u8(value as u8);
            return;
        }
        dst.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
}
