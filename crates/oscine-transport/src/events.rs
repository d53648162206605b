//! Event streams and identity types shared by every transport
//!
//! Each transport exposes its incoming traffic as one or more
//! [`EventStream`]s. A stream is finite: it ends when the transport is
//! stopped (or, for the TCP client, when the connection goes away), which
//! consumers observe as `recv()` returning `None`.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use tokio::sync::mpsc;

/// An async stream of transport events
pub struct EventStream<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> EventStream<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Receive the next event; `None` once the transport has stopped
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

/// Identifier of one accepted TCP server connection
///
/// Assigned monotonically for the lifetime of the server; ids are never
/// reused, so a stale id simply fails with `NotConnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection lifecycle events emitted by the TCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected(ConnectionId),
    Disconnected(ConnectionId),
}

/// TCP client connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: the connect attempt failed or was cancelled
    Failed(String),
}

/// The remote endpoint of an incoming UDP datagram
///
/// Usable as a map key and as the destination of a reply over the same
/// transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderEndpoint(SocketAddr);

impl SenderEndpoint {
    pub(crate) fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl fmt::Display for SenderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
