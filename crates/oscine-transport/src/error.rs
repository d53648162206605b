//! Transport error types

use std::net::IpAddr;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Send attempted on a TCP transport that is not connected, or to a
    /// server connection id that no longer exists
    #[error("not connected")]
    NotConnected,

    /// Reply attempted to a UDP endpoint that has no receive flow
    #[error("unknown sender")]
    UnknownSender,

    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    /// The group address handed to the multicast transport is not in the
    /// multicast range
    #[error("not a multicast address: {0}")]
    NotMulticast(IpAddr),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Packet encoding failed before anything was written
    #[error("encode error: {0}")]
    Encode(#[from] oscine_core::Error),
}
