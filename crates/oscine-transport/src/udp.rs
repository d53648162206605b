//! UDP transports
//!
//! Datagrams map one-to-one onto OSC packets, so there is no framing here.
//! Receiving transports reconstruct per-flow state from each datagram's
//! source address: an endpoint becomes a known flow the moment its first
//! datagram arrives, and replies are only possible to known flows.
//! Malformed datagrams are dropped without disturbing the socket.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use dashmap::DashMap;
use oscine_core::{decode, encode, Packet};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::events::{EventStream, SenderEndpoint};

const CHANNEL_CAPACITY: usize = 1000;

/// Maximum UDP payload
const RECV_BUFFER_SIZE: usize = 65536;

/// Bind a datagram socket with SO_REUSEADDR (and optionally SO_BROADCAST)
/// set before the bind, then hand it to tokio in nonblocking mode.
pub(crate) fn bind_reusable(
    addr: SocketAddr,
    broadcast: bool,
) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if broadcast {
        socket.set_broadcast(true)?;
    }
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Receive loop shared by the datagram transports.
///
/// Registers the source flow before decoding, so an endpoint that has only
/// sent garbage so far is still addressable for replies.
pub(crate) fn spawn_recv_loop(
    socket: Arc<UdpSocket>,
    flows: Option<Arc<DashMap<SocketAddr, ()>>>,
    tx: mpsc::Sender<(Packet, SenderEndpoint)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, from)) => {
                    if let Some(flows) = &flows {
                        flows.insert(from, ());
                    }
                    match decode(&buf[..len]) {
                        Ok(packet) => {
                            if tx.send((packet, SenderEndpoint::new(from))).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!(%from, "dropping malformed datagram: {e}"),
                    }
                }
                Err(e) => {
                    warn!("udp receive error: {e}");
                }
            }
        }
    })
}

/// Fire-and-forget OSC-over-UDP sender
///
/// Lazy: no socket exists until the first send, after which the one
/// outbound socket is reused. Broadcast mode enables local endpoint reuse
/// and broadcast destinations; it is off by default.
pub struct UdpClient {
    broadcast: bool,
    socket: tokio::sync::Mutex<Option<Arc<UdpSocket>>>,
}

impl UdpClient {
    pub fn new() -> Self {
        Self {
            broadcast: false,
            socket: tokio::sync::Mutex::new(None),
        }
    }

    /// A client whose socket allows broadcast destinations
    pub fn with_broadcast() -> Self {
        Self {
            broadcast: true,
            socket: tokio::sync::Mutex::new(None),
        }
    }

    /// Encode and send one packet as one datagram
    pub async fn send(&self, packet: &Packet, host: &str, port: u16) -> Result<()> {
        let payload = encode(packet)?;
        let socket = self.ensure_socket().await?;
        socket
            .send_to(&payload, (host, port))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn ensure_socket(&self) -> Result<Arc<UdpSocket>> {
        let mut guard = self.socket.lock().await;
        if let Some(socket) = guard.as_ref() {
            return Ok(socket.clone());
        }

        let socket = if self.broadcast {
            let std_socket = bind_reusable((Ipv4Addr::UNSPECIFIED, 0).into(), true)
                .map_err(|e| TransportError::BindFailed(e.to_string()))?;
            UdpSocket::from_std(std_socket).map_err(TransportError::Io)?
        } else {
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
                .await
                .map_err(|e| TransportError::BindFailed(e.to_string()))?
        };

        if let Ok(local) = socket.local_addr() {
            debug!(%local, "udp client socket opened");
        }
        let socket = Arc::new(socket);
        *guard = Some(socket.clone());
        Ok(socket)
    }

    /// Drop the outbound socket. Safe to call repeatedly, including before
    /// any send; the next send opens a fresh socket.
    pub async fn close(&self) {
        self.socket.lock().await.take();
    }
}

impl Default for UdpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// An OSC-over-UDP listener with reply-to-sender support
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    flows: Arc<DashMap<SocketAddr, ()>>,
    local_addr: SocketAddr,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpServer {
    /// Bind the given port (0 for ephemeral) and start receiving
    pub async fn bind(port: u16) -> Result<(Self, EventStream<(Packet, SenderEndpoint)>)> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        let local_addr = socket.local_addr().map_err(TransportError::Io)?;

        info!(%local_addr, "udp server listening");

        let socket = Arc::new(socket);
        let flows = Arc::new(DashMap::new());
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let recv_task = spawn_recv_loop(socket.clone(), Some(flows.clone()), tx);

        Ok((
            Self {
                socket,
                flows,
                local_addr,
                recv_task: Mutex::new(Some(recv_task)),
            },
            EventStream::new(rx),
        ))
    }

    /// The bound address, with the ephemeral port resolved
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of endpoints with a live receive flow
    pub fn known_senders(&self) -> usize {
        self.flows.len()
    }

    /// Reply to an endpoint that has previously sent us a datagram.
    ///
    /// Fails with `UnknownSender` when no receive flow exists for the
    /// endpoint.
    pub async fn reply(&self, packet: &Packet, to: &SenderEndpoint) -> Result<()> {
        if !self.flows.contains_key(&to.socket_addr()) {
            return Err(TransportError::UnknownSender);
        }
        let payload = encode(packet)?;
        self.socket
            .send_to(&payload, to.socket_addr())
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    /// Stop receiving and tear down every flow. Idempotent; the event
    /// stream finishes.
    pub fn stop(&self) {
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
        self.flows.clear();
    }
}

/// A symmetric OSC-over-UDP endpoint: receives like [`UdpServer`] and sends
/// to arbitrary destinations from the same port
///
/// The local endpoint is bound with SO_REUSEADDR so two peers can coexist
/// on one host for loopback setups.
pub struct UdpPeer {
    socket: Arc<UdpSocket>,
    flows: Arc<DashMap<SocketAddr, ()>>,
    /// Resolved outbound destinations, cached per (host, port)
    destinations: DashMap<(String, u16), SocketAddr>,
    local_addr: SocketAddr,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpPeer {
    /// Bind the given port (0 for ephemeral) and start receiving
    pub async fn bind(port: u16) -> Result<(Self, EventStream<(Packet, SenderEndpoint)>)> {
        let std_socket = bind_reusable((Ipv4Addr::UNSPECIFIED, port).into(), false)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        let socket = Arc::new(UdpSocket::from_std(std_socket).map_err(TransportError::Io)?);
        let local_addr = socket.local_addr().map_err(TransportError::Io)?;

        info!(%local_addr, "udp peer bound");

        let flows = Arc::new(DashMap::new());
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let recv_task = spawn_recv_loop(socket.clone(), Some(flows.clone()), tx);

        Ok((
            Self {
                socket,
                flows,
                destinations: DashMap::new(),
                local_addr,
                recv_task: Mutex::new(Some(recv_task)),
            },
            EventStream::new(rx),
        ))
    }

    /// The bound address, with the ephemeral port resolved
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send a packet to a destination, resolving and caching the address on
    /// first use
    pub async fn send(&self, packet: &Packet, host: &str, port: u16) -> Result<()> {
        let payload = encode(packet)?;
        let dest = self.destination(host, port).await?;
        self.socket
            .send_to(&payload, dest)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    /// Reply to an endpoint that has previously sent us a datagram
    pub async fn reply(&self, packet: &Packet, to: &SenderEndpoint) -> Result<()> {
        if !self.flows.contains_key(&to.socket_addr()) {
            return Err(TransportError::UnknownSender);
        }
        let payload = encode(packet)?;
        self.socket
            .send_to(&payload, to.socket_addr())
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn destination(&self, host: &str, port: u16) -> Result<SocketAddr> {
        if let Some(addr) = self.destinations.get(&(host.to_string(), port)) {
            return Ok(*addr);
        }
        let addr = lookup_host((host, port))
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
            .next()
            .ok_or_else(|| {
                TransportError::ConnectionFailed(format!("no address found for {host}"))
            })?;
        self.destinations.insert((host.to_string(), port), addr);
        Ok(addr)
    }

    /// Stop receiving and tear down flows and the destination cache.
    /// Idempotent; the event stream finishes.
    pub fn stop(&self) {
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
        self.flows.clear();
        self.destinations.clear();
    }
}
