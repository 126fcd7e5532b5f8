// src/core/mod.rs

//! The central module containing the protocol handling and shared state of the proxy.

pub mod commands;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod permissions;
pub mod protocol;
pub mod queue;
pub mod reconnect;
pub mod state;
pub mod tablist;

pub use errors::ProxyError;
pub use protocol::Packet;
