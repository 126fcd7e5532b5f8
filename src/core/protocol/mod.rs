// src/core/protocol/mod.rs

//! Wire-level pieces of the game protocol: framing, packet dispatch shapes,
//! entity id rewriting and the private control channel.

pub mod codec;
pub mod entity_map;
pub mod packet;
pub mod plugin_channel;
pub mod wire;

pub use codec::PacketCodec;
pub use packet::{LoginParams, Packet};
pub use plugin_channel::{ChannelMessage, PRIVATE_CHANNEL};
