// src/core/protocol/plugin_channel.rs

//! The proxy's private control sub-protocol, carried inside plugin messages.
//!
//! Backend plugins talk to the proxy by sending a plugin message on `PRIVATE_CHANNEL`
//! whose payload starts with an opcode string. Strings are u16-length-prefixed UTF-8
//! and binary payloads are prefixed with an i16 byte count.

use super::wire::{WireReader, put_short_bytes, put_utf};
use crate::core::ProxyError;
use bytes::{Bytes, BytesMut};

/// The channel name reserved for proxy control messages.
pub const PRIVATE_CHANNEL: &str = "BungeeCord";

/// The channel used to announce which plugin channels the proxy listens on.
pub const REGISTER_CHANNEL: &str = "REGISTER";

/// `Forward` target that addresses every configured server.
pub const FORWARD_ALL: &str = "ALL";

/// A decoded control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    /// Relay `data` on `channel` to the named server, or to all of them.
    Forward {
        target: String,
        channel: String,
        data: Bytes,
    },
    /// Move the player to another configured server.
    Connect { server: String },
    /// Stop relaying from the current backend; a switch is already underway elsewhere.
    Disconnect,
    /// An opcode this proxy does not understand.
    Unknown(String),
}

impl ChannelMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, ProxyError> {
        let mut r = WireReader::new(payload);
        let opcode = r.read_utf()?;
        let message = match opcode.as_str() {
            "Forward" => {
                let target = r.read_utf()?;
                let channel = r.read_utf()?;
                let data = Bytes::copy_from_slice(r.read_short_bytes()?);
                ChannelMessage::Forward {
                    target,
                    channel,
                    data,
                }
            }
            "Connect" => ChannelMessage::Connect {
                server: r.read_utf()?,
            },
            "Disconnect" => ChannelMessage::Disconnect,
            _ => ChannelMessage::Unknown(opcode),
        };
        Ok(message)
    }

    pub fn encode(&self) -> Result<Bytes, ProxyError> {
        let mut dst = BytesMut::new();
        match self {
            ChannelMessage::Forward {
                target,
                channel,
                data,
            } => {
                put_utf(&mut dst, "Forward")?;
                put_utf(&mut dst, target)?;
                put_utf(&mut dst, channel)?;
                put_short_bytes(&mut dst, data)?;
            }
            ChannelMessage::Connect { server } => {
                put_utf(&mut dst, "Connect")?;
                put_utf(&mut dst, server)?;
            }
            ChannelMessage::Disconnect => put_utf(&mut dst, "Disconnect")?,
            ChannelMessage::Unknown(opcode) => put_utf(&mut dst, opcode)?,
        }
        Ok(dst.freeze())
    }
}

/// Builds the payload of the `REGISTER` message: the private channel followed by
/// `extra` channels, NUL-separated, with duplicates dropped.
pub fn register_payload<S: AsRef<str>>(extra: &[S]) -> Bytes {
    let mut channels: Vec<&str> = vec![PRIVATE_CHANNEL];
    for channel in extra {
        let channel = channel.as_ref();
        if !channel.is_empty() && !channels.contains(&channel) {
            channels.push(channel);
        }
    }
    Bytes::from(channels.join("\0"))
}
