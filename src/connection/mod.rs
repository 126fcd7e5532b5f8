// src/connection/mod.rs

//! Manages player sessions: the client connection lifecycle, backend attachments,
//! and the two pumps that relay packets between them.

// Declare the sub-modules of the `connection` module.
mod backend;
mod downstream;
mod guard;
mod handler;
pub mod transport;
mod upstream;
mod user;

// Publicly re-export the primary types from the sub-modules.
pub use backend::{BackendConnector, ServerConnection, TcpConnector};
pub use guard::SessionGuard;
pub use handler::ConnectionHandler;
pub use transport::{PacketSink, PacketStream};
pub use user::{END_OF_STREAM, UserConnection};
