// src/core/errors.rs

//! Defines the primary error type for the proxy core.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures inside a player session.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// A frame or field could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backend refused the player with an explicit, human-readable reason.
    #[error("{0}")]
    Kicked(String),

    #[error("Unknown server '{0}'")]
    UnknownServer(String),

    #[error("Timed out while connecting to backend")]
    ConnectTimeout,

    #[error("Session is not attached to a backend")]
    NotConnected,

    #[error("Internal proxy error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// A short, stable category name that is safe to show to players.
    ///
    /// The full error is logged; only this category crosses the wire.
    pub fn category(&self) -> &'static str {
        match self {
            ProxyError::Io(_) => "IOException",
            ProxyError::Protocol(_) => "ProtocolException",
            ProxyError::Kicked(_) => "KickException",
            ProxyError::UnknownServer(_) => "UnknownServerException",
            ProxyError::ConnectTimeout => "TimeoutException",
            ProxyError::NotConnected => "NotConnectedException",
            ProxyError::Internal(_) => "InternalException",
        }
    }

    /// Returns true when the error is the peer going away rather than a fault.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, ProxyError::Io(e) if matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ))
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for ProxyError {
    fn clone(&self) -> Self {
        match self {
            ProxyError::Io(e) => ProxyError::Io(Arc::clone(e)),
            ProxyError::Protocol(s) => ProxyError::Protocol(s.clone()),
            ProxyError::Kicked(s) => ProxyError::Kicked(s.clone()),
            ProxyError::UnknownServer(s) => ProxyError::UnknownServer(s.clone()),
            ProxyError::ConnectTimeout => ProxyError::ConnectTimeout,
            ProxyError::NotConnected => ProxyError::NotConnected,
            ProxyError::Internal(s) => ProxyError::Internal(s.clone()),
        }
    }
}

impl PartialEq for ProxyError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ProxyError::Io(e1), ProxyError::Io(e2)) => e1.kind() == e2.kind(),
            (ProxyError::Protocol(s1), ProxyError::Protocol(s2)) => s1 == s2,
            (ProxyError::Kicked(s1), ProxyError::Kicked(s2)) => s1 == s2,
            (ProxyError::UnknownServer(s1), ProxyError::UnknownServer(s2)) => s1 == s2,
            (ProxyError::Internal(s1), ProxyError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for ProxyError {
    fn from(e: std::io::Error) -> Self {
        ProxyError::Io(Arc::new(e))
    }
}

impl From<tokio::time::error::Elapsed> for ProxyError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProxyError::ConnectTimeout
    }
}

impl From<std::string::FromUtf16Error> for ProxyError {
    fn from(e: std::string::FromUtf16Error) -> Self {
        ProxyError::Protocol(format!("invalid UTF-16 string: {e}"))
    }
}

impl From<std::string::FromUtf8Error> for ProxyError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        ProxyError::Protocol(format!("invalid UTF-8 string: {e}"))
    }
}
