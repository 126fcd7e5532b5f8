// src/core/protocol/packet.rs

//! The closed set of packet shapes the proxy inspects.
//!
//! A frame is decoded into a `Packet` once, for dispatch. The pumps keep the original
//! bytes alongside it and forward those (after id rewriting), so decoding never has
//! to be lossless for packets the proxy does not understand.

use super::wire::{WireReader, put_short_bytes, put_string};
use crate::core::ProxyError;
use bytes::{BufMut, Bytes, BytesMut};

/// Packet type tags.
pub mod ids {
    pub const KEEP_ALIVE: u8 = 0x00;
    pub const LOGIN: u8 = 0x01;
    pub const HANDSHAKE: u8 = 0x02;
    pub const CHAT: u8 = 0x03;
    pub const RESPAWN: u8 = 0x09;
    pub const PLAYER_LIST_ITEM: u8 = 0xC9;
    pub const CLIENT_STATUS: u8 = 0xCD;
    pub const PLUGIN_MESSAGE: u8 = 0xFA;
    pub const ENCRYPTION_REQUEST: u8 = 0xFD;
    pub const KICK: u8 = 0xFF;
}

/// Every world-transition packet the proxy sends uses this height.
pub const WORLD_HEIGHT: i16 = 256;

/// The world parameters a backend hands out when a player attaches to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginParams {
    pub entity_id: i32,
    pub level_type: String,
    pub game_mode: u8,
    pub dimension: i8,
    pub difficulty: u8,
    pub max_players: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    KeepAlive {
        id: i32,
    },
    Login(LoginParams),
    Handshake {
        protocol_version: u8,
        username: String,
        host: String,
        port: i32,
    },
    Chat {
        message: String,
    },
    Respawn {
        dimension: i32,
        difficulty: u8,
        game_mode: u8,
        world_height: i16,
        level_type: String,
    },
    PlayerListItem {
        username: String,
        online: bool,
        ping: i16,
    },
    ClientStatus {
        payload: u8,
    },
    PluginMessage {
        channel: String,
        data: Bytes,
    },
    /// The contents are never inspected; the proxy does not negotiate encryption.
    EncryptionRequest,
    Kick {
        reason: String,
    },
    /// Any packet type the proxy relays without looking inside.
    Other(u8),
}

impl Packet {
    /// Decodes the leading tag and, for the types the proxy dispatches on, the fields.
    pub fn decode(frame: &[u8]) -> Result<Packet, ProxyError> {
        let mut r = WireReader::new(frame);
        let tag = r.read_u8()?;
        let packet = match tag {
            ids::KEEP_ALIVE => Packet::KeepAlive { id: r.read_i32()? },
            ids::LOGIN => Packet::Login(LoginParams {
                entity_id: r.read_i32()?,
                level_type: r.read_string()?,
                game_mode: r.read_u8()?,
                dimension: r.read_i8()?,
                difficulty: r.read_u8()?,
                max_players: {
                    // One unused byte precedes the player cap.
                    r.read_u8()?;
                    r.read_u8()?
                },
            }),
            ids::HANDSHAKE => Packet::Handshake {
                protocol_version: r.read_u8()?,
                username: r.read_string()?,
                host: r.read_string()?,
                port: r.read_i32()?,
            },
            ids::CHAT => Packet::Chat {
                message: r.read_string()?,
            },
            ids::RESPAWN => Packet::Respawn {
                dimension: r.read_i32()?,
                difficulty: r.read_u8()?,
                game_mode: r.read_u8()?,
                world_height: r.read_i16()?,
                level_type: r.read_string()?,
            },
            ids::PLAYER_LIST_ITEM => Packet::PlayerListItem {
                username: r.read_string()?,
                online: r.read_bool()?,
                ping: r.read_i16()?,
            },
            ids::CLIENT_STATUS => Packet::ClientStatus {
                payload: r.read_u8()?,
            },
            ids::PLUGIN_MESSAGE => Packet::PluginMessage {
                channel: r.read_string()?,
                data: Bytes::copy_from_slice(r.read_short_bytes()?),
            },
            ids::ENCRYPTION_REQUEST => Packet::EncryptionRequest,
            ids::KICK => Packet::Kick {
                reason: r.read_string()?,
            },
            other => Packet::Other(other),
        };
        Ok(packet)
    }

    /// The leading type tag of this packet on the wire.
    pub fn tag(&self) -> u8 {
        match self {
            Packet::KeepAlive { .. } => ids::KEEP_ALIVE,
            Packet::Login(_) => ids::LOGIN,
            Packet::Handshake { .. } => ids::HANDSHAKE,
            Packet::Chat { .. } => ids::CHAT,
            Packet::Respawn { .. } => ids::RESPAWN,
            Packet::PlayerListItem { .. } => ids::PLAYER_LIST_ITEM,
            Packet::ClientStatus { .. } => ids::CLIENT_STATUS,
            Packet::PluginMessage { .. } => ids::PLUGIN_MESSAGE,
            Packet::EncryptionRequest => ids::ENCRYPTION_REQUEST,
            Packet::Kick { .. } => ids::KICK,
            Packet::Other(tag) => *tag,
        }
    }

    /// Serializes the packet body (tag plus fields), without the frame length prefix.
    ///
    /// `EncryptionRequest` and `Other` carry no fields and encode as the bare tag.
    pub fn encode(&self) -> Result<Bytes, ProxyError> {
        let mut dst = BytesMut::with_capacity(16);
        dst.put_u8(self.tag());
        match self {
            Packet::KeepAlive { id } => dst.put_i32(*id),
            Packet::Login(login) => {
                dst.put_i32(login.entity_id);
                put_string(&mut dst, &login.level_type)?;
                dst.put_u8(login.game_mode);
                dst.put_i8(login.dimension);
                dst.put_u8(login.difficulty);
                dst.put_u8(0);
                dst.put_u8(login.max_players);
            }
            Packet::Handshake {
                protocol_version,
                username,
                host,
                port,
            } => {
                dst.put_u8(*protocol_version);
                put_string(&mut dst, username)?;
                put_string(&mut dst, host)?;
                dst.put_i32(*port);
            }
            Packet::Chat { message } => put_string(&mut dst, message)?,
            Packet::Respawn {
                dimension,
                difficulty,
                game_mode,
                world_height,
                level_type,
            } => {
                dst.put_i32(*dimension);
                dst.put_u8(*difficulty);
                dst.put_u8(*game_mode);
                dst.put_i16(*world_height);
                put_string(&mut dst, level_type)?;
            }
            Packet::PlayerListItem {
                username,
                online,
                ping,
            } => {
                put_string(&mut dst, username)?;
                dst.put_u8(u8::from(*online));
                dst.put_i16(*ping);
            }
            Packet::ClientStatus { payload } => dst.put_u8(*payload),
            Packet::PluginMessage { channel, data } => {
                put_string(&mut dst, channel)?;
                put_short_bytes(&mut dst, data)?;
            }
            Packet::Kick { reason } => put_string(&mut dst, reason)?,
            Packet::EncryptionRequest | Packet::Other(_) => {}
        }
        Ok(dst.freeze())
    }

    /// The world-transition packet that moves the client into the world described by `login`.
    pub fn respawn_for(login: &LoginParams) -> Packet {
        Packet::Respawn {
            dimension: i32::from(login.dimension),
            difficulty: login.difficulty,
            game_mode: login.game_mode,
            world_height: WORLD_HEIGHT,
            level_type: login.level_type.clone(),
        }
    }

    /// A throwaway world transition into `dimension`, used to make the client drop cached
    /// world state before the next backend's data arrives.
    pub fn placeholder_respawn(dimension: i32) -> Packet {
        Packet::Respawn {
            dimension,
            difficulty: 0,
            game_mode: 0,
            world_height: WORLD_HEIGHT,
            level_type: "DEFAULT".to_string(),
        }
    }
}
