//! UDP multicast transport
//!
//! One socket carries the group membership, group sends, and unicast
//! replies. Loopback is enabled, so a sole group member receives its own
//! packets.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use oscine_core::{encode, Packet};
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{Result, TransportError};
use crate::events::{EventStream, SenderEndpoint};
use crate::udp::{bind_reusable, spawn_recv_loop};

const CHANNEL_CAPACITY: usize = 1000;

/// OSC over an IPv4/IPv6 multicast group
pub struct UdpMulticast {
    socket: Arc<UdpSocket>,
    group: SocketAddr,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpMulticast {
    /// Join `group` on `port` and start receiving.
    ///
    /// Returns once the membership and the receive loop are in place.
    /// `group` must be in the multicast range (224.0.0.0/4 or the IPv6
    /// equivalent); bind and join failures are surfaced here.
    pub async fn start(
        group: IpAddr,
        port: u16,
    ) -> Result<(Self, EventStream<(Packet, SenderEndpoint)>)> {
        if !group.is_multicast() {
            return Err(TransportError::NotMulticast(group));
        }

        let bind_addr: SocketAddr = match group {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, port).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, port).into(),
        };
        let std_socket = bind_reusable(bind_addr, false)
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        let socket = UdpSocket::from_std(std_socket).map_err(TransportError::Io)?;

        match group {
            IpAddr::V4(g) => {
                socket
                    .join_multicast_v4(g, Ipv4Addr::UNSPECIFIED)
                    .map_err(|e| {
                        TransportError::ConnectionFailed(format!("multicast join: {e}"))
                    })?;
                socket
                    .set_multicast_loop_v4(true)
                    .map_err(TransportError::Io)?;
            }
            IpAddr::V6(g) => {
                socket.join_multicast_v6(&g, 0).map_err(|e| {
                    TransportError::ConnectionFailed(format!("multicast join: {e}"))
                })?;
                socket
                    .set_multicast_loop_v6(true)
                    .map_err(TransportError::Io)?;
            }
        }

        // With port 0 the group target must carry the resolved port
        let bound_port = socket.local_addr().map_err(TransportError::Io)?.port();

        info!(%group, port = bound_port, "joined multicast group");

        let socket = Arc::new(socket);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let recv_task = spawn_recv_loop(socket.clone(), None, tx);

        Ok((
            Self {
                socket,
                group: SocketAddr::new(group, bound_port),
                recv_task: Mutex::new(Some(recv_task)),
            },
            EventStream::new(rx),
        ))
    }

    /// The group address and port this transport is joined to
    pub fn group(&self) -> SocketAddr {
        self.group
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    /// Send a packet to the whole group
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        let payload = encode(packet)?;
        self.socket
            .send_to(&payload, self.group)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    /// Unicast a packet to one member over the same socket
    pub async fn send_to(&self, packet: &Packet, to: &SenderEndpoint) -> Result<()> {
        let payload = encode(packet)?;
        self.socket
            .send_to(&payload, to.socket_addr())
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    /// Leave the group and stop receiving. Idempotent; the event stream
    /// finishes.
    pub fn stop(&self) {
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
            match self.group.ip() {
                IpAddr::V4(g) => {
                    let _ = self.socket.leave_multicast_v4(g, Ipv4Addr::UNSPECIFIED);
                }
                IpAddr::V6(g) => {
                    let _ = self.socket.leave_multicast_v6(&g, 0);
                }
            }
        }
    }
}
